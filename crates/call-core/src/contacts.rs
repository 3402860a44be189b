//! Reverse lookup of callers against a contacts collaborator

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::CallResult;
use crate::number::{exact_lookup_forms, fallback_suffix, NumberPattern};
use crate::session::RemoteContact;

/// A contact as stored by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub display_name: String,
    pub numbers: Vec<String>,
}

impl Contact {
    pub fn new(id: i64, display_name: impl Into<String>, numbers: Vec<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            numbers,
        }
    }
}

impl From<Contact> for RemoteContact {
    fn from(contact: Contact) -> Self {
        Self {
            id: contact.id,
            display_name: contact.display_name,
        }
    }
}

/// Contacts collaborator
///
/// Returns the first contact, in the directory's natural order, having a
/// number that satisfies any of `patterns`.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn find_by_number(&self, patterns: &[NumberPattern]) -> CallResult<Option<Contact>>;
}

/// Resolve the contact behind a caller number
///
/// Exact national/international forms are tried first; when nothing matches,
/// the last six digits are tried as a suffix. Lookup failures are logged and
/// treated as "unknown caller".
pub async fn resolve_contact(
    directory: &dyn ContactDirectory,
    number: &str,
    country_code: Option<&str>,
) -> Option<RemoteContact> {
    let exact: Vec<NumberPattern> = exact_lookup_forms(number, country_code)
        .into_iter()
        .map(NumberPattern::Exact)
        .collect();
    if exact.is_empty() {
        return None;
    }

    match directory.find_by_number(&exact).await {
        Ok(Some(contact)) => {
            debug!(contact_id = contact.id, "Caller matched by exact number");
            return Some(contact.into());
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, category = e.category(), "Contact lookup failed");
            return None;
        }
    }

    let suffix = fallback_suffix(number)?;
    match directory.find_by_number(&[NumberPattern::EndsWith(suffix)]).await {
        Ok(found) => {
            if let Some(contact) = &found {
                debug!(contact_id = contact.id, "Caller matched by number suffix");
            }
            found.map(Into::into)
        }
        Err(e) => {
            warn!(error = %e, category = e.category(), "Contact suffix lookup failed");
            None
        }
    }
}

/// Directory kept in memory, matched in insertion order
///
/// ```rust
/// use softphone_call_core::{resolve_contact, Contact, InMemoryContacts};
/// # tokio_test::block_on(async {
/// let reception = Contact::new(1, "Reception", vec!["+32 2 555 01 00".into()]);
/// let directory = InMemoryContacts::new(vec![reception]);
/// let contact = resolve_contact(&directory, "02 555 01 00", Some("32")).await;
/// assert_eq!(contact.map(|c| c.display_name), Some("Reception".to_string()));
/// # });
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryContacts {
    contacts: Arc<RwLock<Vec<Contact>>>,
}

impl InMemoryContacts {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self {
            contacts: Arc::new(RwLock::new(contacts)),
        }
    }

    pub async fn insert(&self, contact: Contact) {
        self.contacts.write().await.push(contact);
    }
}

#[async_trait]
impl ContactDirectory for InMemoryContacts {
    async fn find_by_number(&self, patterns: &[NumberPattern]) -> CallResult<Option<Contact>> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .iter()
            .find(|contact| {
                contact
                    .numbers
                    .iter()
                    .any(|stored| patterns.iter().any(|pattern| pattern.matches(stored)))
            })
            .cloned())
    }
}
