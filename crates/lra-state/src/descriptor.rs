//! # Compensator Descriptors
//!
//! A participant enlists by handing the coordinator a descriptor of its
//! callback endpoints. The descriptor is an RFC 8288 `Link` value:
//!
//! ```text
//! <http://svc/complete>; rel="complete", <http://svc/compensate>; rel="compensate"
//! ```
//!
//! How a participant discovers its own endpoints is not the coordinator's
//! concern; it only parses the string. Recognized relations are `complete`,
//! `compensate`, `forget`, `status`, `after` and `leave`. Unknown relations
//! are ignored, and a descriptor with no recognized relation is rejected.

use serde::{Deserialize, Serialize};
use url::Url;

use lra_core::ValidationError;

/// The set of callback endpoints a participant registered.
///
/// Two participants are the same participant when their endpoint sets are
/// equal; that is what makes `join` idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompensatorLinks {
    /// Called with `PUT` when the LRA closes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<Url>,
    /// Called with `PUT` when the LRA cancels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensate: Option<Url>,
    /// Called with `DELETE` once the coordinator no longer needs the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forget: Option<Url>,
    /// Polled with `GET` when a complete/compensate call did not settle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Url>,
    /// Called with `PUT` once the LRA reached its final status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Url>,
    /// Participant-side leave endpoint. Recorded, never called.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave: Option<Url>,
}

impl CompensatorLinks {
    /// Parse a `Link`-style descriptor.
    pub fn parse(descriptor: &str) -> Result<Self, ValidationError> {
        let mut links = Self::default();
        let mut recognized = 0usize;

        for link_value in split_link_values(descriptor) {
            let (target, params) = split_target(&link_value)?;
            let url = Url::parse(target).map_err(|e| {
                ValidationError::InvalidDescriptor(format!("invalid URI <{target}>: {e}"))
            })?;

            for rel in relations(params) {
                let slot = match rel.as_str() {
                    "complete" => &mut links.complete,
                    "compensate" => &mut links.compensate,
                    "forget" => &mut links.forget,
                    "status" => &mut links.status,
                    "after" => &mut links.after,
                    "leave" => &mut links.leave,
                    _ => continue,
                };
                *slot = Some(url.clone());
                recognized += 1;
            }
        }

        if recognized == 0 {
            return Err(ValidationError::InvalidDescriptor(
                "no complete, compensate, forget, status, after or leave link".to_string(),
            ));
        }
        Ok(links)
    }

    /// A participant with neither complete nor compensate only wants the
    /// after notification.
    pub fn is_listener_only(&self) -> bool {
        self.complete.is_none() && self.compensate.is_none()
    }

    /// Render the descriptor back into `Link` form.
    pub fn to_link_value(&self) -> String {
        [
            ("complete", &self.complete),
            ("compensate", &self.compensate),
            ("forget", &self.forget),
            ("status", &self.status),
            ("after", &self.after),
            ("leave", &self.leave),
        ]
        .iter()
        .filter_map(|(rel, url)| url.as_ref().map(|u| format!("<{u}>; rel=\"{rel}\"")))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Split a descriptor into link-values on commas that are outside `<...>`
/// and outside quoted strings.
fn split_link_values(descriptor: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_target = false;
    let mut in_quotes = false;

    for c in descriptor.chars() {
        match c {
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            '"' if !in_target => in_quotes = !in_quotes,
            ',' if !in_target && !in_quotes => {
                if !current.trim().is_empty() {
                    values.push(current.trim().to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        values.push(current.trim().to_string());
    }
    values
}

/// Split `<uri>; params` into the uri and the parameter tail.
fn split_target(link_value: &str) -> Result<(&str, &str), ValidationError> {
    let rest = link_value.strip_prefix('<').ok_or_else(|| {
        ValidationError::InvalidDescriptor(format!("link value must start with '<': {link_value}"))
    })?;
    let end = rest.find('>').ok_or_else(|| {
        ValidationError::InvalidDescriptor(format!("unterminated '<' in: {link_value}"))
    })?;
    Ok((rest[..end].trim(), &rest[end + 1..]))
}

/// Extract the (possibly space-separated) `rel` values from a parameter tail.
fn relations(params: &str) -> Vec<String> {
    params
        .split(';')
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("rel") {
                return None;
            }
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        })
        .flat_map(|value| {
            value
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}
