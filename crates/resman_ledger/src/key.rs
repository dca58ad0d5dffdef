//! Composite keys.
//!
//! Records live in named collections. A record's ledger key joins the
//! collection name and the record's key components with [`KEY_DELIMITER`]:
//!
//! ```text
//! \0<collection>\0<part>\0<part>\0
//! ```
//!
//! The leading delimiter keeps composite keys out of the plain-key namespace,
//! and the trailing one makes `\0<collection>\0` a prefix of every key in the
//! collection but of no key in a collection whose name merely starts the same.

use crate::error::{LedgerError, LedgerResult};

/// Delimiter between composite key components.
pub const KEY_DELIMITER: char = '\u{0}';

fn check_component(component: &str) -> LedgerResult<()> {
    if component.contains(KEY_DELIMITER) {
        return Err(LedgerError::invalid_key(format!(
            "component {component:?} contains the key delimiter"
        )));
    }
    Ok(())
}

/// Builds the composite key for `parts` inside `collection`.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidKey`] if the collection name is empty or any
/// component contains [`KEY_DELIMITER`].
pub fn composite_key<S: AsRef<str>>(collection: &str, parts: &[S]) -> LedgerResult<String> {
    let mut key = collection_prefix(collection)?;
    for part in parts {
        let part = part.as_ref();
        check_component(part)?;
        key.push_str(part);
        key.push(KEY_DELIMITER);
    }
    Ok(key)
}

/// Returns the scan prefix shared by every key of `collection`.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidKey`] if the collection name is empty or
/// contains [`KEY_DELIMITER`].
pub fn collection_prefix(collection: &str) -> LedgerResult<String> {
    if collection.is_empty() {
        return Err(LedgerError::invalid_key("collection name is empty"));
    }
    check_component(collection)?;

    let mut prefix = String::with_capacity(collection.len() + 2);
    prefix.push(KEY_DELIMITER);
    prefix.push_str(collection);
    prefix.push(KEY_DELIMITER);
    Ok(prefix)
}

/// Splits a composite key back into its collection and components.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidKey`] if `key` was not produced by
/// [`composite_key`].
pub fn split_composite_key(key: &str) -> LedgerResult<(String, Vec<String>)> {
    let body = key
        .strip_prefix(KEY_DELIMITER)
        .and_then(|rest| rest.strip_suffix(KEY_DELIMITER))
        .ok_or_else(|| LedgerError::invalid_key(format!("{key:?} is not a composite key")))?;

    let mut components = body.split(KEY_DELIMITER).map(str::to_string);
    let collection = components
        .next()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| LedgerError::invalid_key(format!("{key:?} has no collection")))?;

    Ok((collection, components.collect()))
}
