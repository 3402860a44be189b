//! Scripted softphone session against the simulated transport
//!
//! Places an outbound call, answers an inbound one and prints the panel state
//! after every step.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use softphone_call_core::{CallConfig, CallState, Contact, InMemoryContacts};
use softphone_panel::logging::log_welcome;
use softphone_panel::{
    setup_logging, InMemoryCallHistory, LoggingConfig, PanelConfig, PanelState, Softphone,
    SoftphoneConfig, Tab, UserInput, Visibility, VERSION,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "softphone-demo",
    version,
    about = "Drive the softphone panel against a simulated transport"
)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Number to call
    #[arg(short, long, default_value = "+1 555-0100")]
    number: String,

    /// Number of the simulated inbound caller
    #[arg(short, long, default_value = "0032 455 12 34 56")]
    inbound: String,

    /// Simulated network delay in milliseconds
    #[arg(short, long, default_value = "500")]
    delay_ms: u64,

    /// How long each call stays up, in seconds
    #[arg(short = 't', long, default_value = "2")]
    talk_secs: u64,

    /// Log level (trace, debug, info, warn, error); overrides the file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Include file and line information in log lines
    #[arg(long)]
    log_locations: bool,

    /// Log span enter and exit events
    #[arg(long)]
    log_spans: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(&self, mut config: SoftphoneConfig) -> SoftphoneConfig {
        config.call = config.call.with_demo_mode(Duration::from_millis(self.delay_ms));
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.log_locations {
            config.logging = config.logging.with_file_info();
        }
        if self.log_spans {
            config.logging = config.logging.with_spans();
        }
        config
    }
}

fn print_state(label: &str, state: &PanelState) {
    let call = state
        .call
        .as_ref()
        .map(|call| format!("{} {} ({})", call.direction, call.remote_number, call.state))
        .unwrap_or_else(|| "no call".to_string());
    println!(
        "[{:<10}] {:?} tab={:?} button={:?} incoming={} muted={} | {}",
        label,
        state.visibility,
        state.active_tab,
        state.primary_button,
        state.incoming_controls,
        state.muted,
        call
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SoftphoneConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => SoftphoneConfig::new()
            .with_call(CallConfig::new().with_country_code("32"))
            .with_panel(PanelConfig {
                start_visible: true,
                default_tab: Tab::Recent,
            })
            .with_logging(LoggingConfig::new("info", "softphone-demo")),
    };
    let config = args.apply(config);
    config.validate().context("invalid command-line options")?;

    setup_logging(&config.logging).context("failed to initialize logging")?;
    log_welcome(&config.logging.app_name, VERSION);

    let contacts = InMemoryContacts::new(vec![Contact::new(
        1,
        "Lotte Peeters",
        vec!["+32 455 12 34 56".into()],
    )]);
    let history = InMemoryCallHistory::new();
    let mut phone = Softphone::builder(config)
        .with_contacts(Arc::new(contacts))
        .with_history(Arc::new(history.clone()))
        .start()?;
    let talk = Duration::from_secs(args.talk_secs);

    // Outbound call
    if phone.state().visibility == Visibility::Hidden {
        phone.send(UserInput::ToggleDisplay)?;
    }
    phone.send(UserInput::CallFromTab {
        number: args.number.clone(),
    })?;
    let state = phone.wait_for(|s| s.call_state() == CallState::Ringing).await?;
    print_state("dialing", &state);
    let state = phone.wait_for(|s| s.call_state() == CallState::Ongoing).await?;
    print_state("answered", &state);

    phone.send(UserInput::PressKey('1'))?;
    phone.send(UserInput::ToggleMute)?;
    let state = phone.wait_for(|s| s.muted).await?;
    print_state("muted", &state);
    tokio::time::sleep(talk).await;

    phone.send(UserInput::Hangup)?;
    let state = phone.wait_for(|s| !s.is_in_call()).await?;
    print_state("hung up", &state);

    // Inbound call
    let call_id = phone.simulate_incoming_call(&args.inbound)?;
    let state = phone.wait_for(|s| s.incoming_controls).await?;
    print_state("incoming", &state);

    phone.send(UserInput::Accept)?;
    let state = phone.wait_for(|s| s.call_state() == CallState::Ongoing).await?;
    print_state("talking", &state);
    tokio::time::sleep(talk).await;

    phone.simulate_remote_bye(call_id)?;
    let state = phone.wait_for(|s| !s.is_in_call()).await?;
    print_state("remote bye", &state);

    for signal in phone.drain_signals() {
        info!(?signal, "Panel signal");
    }
    for entry in history.entries().await {
        println!(
            "history: {} {} {:?} contact={:?}",
            entry.direction,
            entry.number,
            entry.status,
            entry.contact.map(|c| c.display_name)
        );
    }

    phone.shutdown().await?;
    Ok(())
}
