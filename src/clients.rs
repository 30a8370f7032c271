//! Client Compatibility Ruleset Module
//!
//! Static per-client constraints for the supported email clients. The table is
//! read-only and shared by every request.

use crate::error::Result;
use crate::models::ClientId;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientProfile {
    pub id: ClientId,
    pub max_css_size: Option<usize>,
    pub supports_media_queries: bool,
    pub blocked_css_properties: &'static [&'static str],
    pub requires_table_layout: bool,
    pub features: &'static [&'static str],
    pub quirks: &'static [&'static str],
}

pub const OUTLOOK_UNSUPPORTED: [&str; 6] = [
    "border-radius",
    "box-shadow",
    "text-shadow",
    "transform",
    "transition",
    "animation",
];

static PROFILES: [ClientProfile; 5] = [
    ClientProfile {
        id: ClientId::Gmail,
        max_css_size: Some(50_000),
        supports_media_queries: true,
        blocked_css_properties: &["position", "z-index", "float"],
        requires_table_layout: false,
        features: &["media_queries", "inline_styles", "basic_css"],
        quirks: &["strips_style_in_body", "clips_over_102kb"],
    },
    ClientProfile {
        id: ClientId::Outlook,
        max_css_size: None,
        supports_media_queries: false,
        blocked_css_properties: &OUTLOOK_UNSUPPORTED,
        requires_table_layout: true,
        features: &["table_layout", "mso_conditionals", "basic_css"],
        quirks: &["word_rendering_engine", "vml_backgrounds"],
    },
    ClientProfile {
        id: ClientId::AppleMail,
        max_css_size: None,
        supports_media_queries: true,
        blocked_css_properties: &[],
        requires_table_layout: false,
        features: &["full_css", "media_queries", "modern_features"],
        quirks: &[],
    },
    ClientProfile {
        id: ClientId::Yahoo,
        max_css_size: Some(30_000),
        supports_media_queries: true,
        blocked_css_properties: &["position"],
        requires_table_layout: false,
        features: &["basic_css", "media_queries"],
        quirks: &["renames_classes"],
    },
    ClientProfile {
        id: ClientId::Thunderbird,
        max_css_size: None,
        supports_media_queries: true,
        blocked_css_properties: &["position"],
        requires_table_layout: false,
        features: &["good_css", "media_queries"],
        quirks: &[],
    },
];

pub fn profile(id: ClientId) -> &'static ClientProfile {
    let idx = match id {
        ClientId::Gmail => 0,
        ClientId::Outlook => 1,
        ClientId::AppleMail => 2,
        ClientId::Yahoo => 3,
        ClientId::Thunderbird => 4,
    };
    &PROFILES[idx]
}

/// Looks a profile up by its string identifier.
pub fn get_profile(client_id: &str) -> Result<&'static ClientProfile> {
    let id: ClientId = client_id.parse()?;
    Ok(profile(id))
}

/// Validates a caller-supplied list of identifiers, keeping the caller's order.
pub fn parse_clients<S: AsRef<str>>(ids: &[S]) -> Result<Vec<ClientId>> {
    ids.iter().map(|id| id.as_ref().parse()).collect()
}

pub fn profiles_for(ids: &[ClientId]) -> Vec<&'static ClientProfile> {
    ids.iter().map(|id| profile(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InboxerError;

    #[test]
    fn test_profile_table_matches_ids() {
        for id in ClientId::ALL {
            assert_eq!(profile(id).id, id);
        }
    }

    #[test]
    fn test_get_profile() {
        let outlook = get_profile("outlook").unwrap();
        assert!(outlook.requires_table_layout);
        assert!(!outlook.supports_media_queries);
        assert_eq!(outlook.blocked_css_properties.len(), 6);

        assert_eq!(get_profile("yahoo").unwrap().max_css_size, Some(30_000));
        assert!(get_profile("apple_mail").unwrap().blocked_css_properties.is_empty());

        match get_profile("lotus_notes") {
            Err(InboxerError::UnknownClient(id)) => assert_eq!(id, "lotus_notes"),
            other => panic!("expected UnknownClient, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_clients_preserves_order() {
        let ids = parse_clients(&["outlook", "gmail", "thunderbird"]).unwrap();
        assert_eq!(ids, vec![ClientId::Outlook, ClientId::Gmail, ClientId::Thunderbird]);

        assert!(parse_clients(&["gmail", "aol"]).is_err());
        assert!(parse_clients::<&str>(&[]).unwrap().is_empty());
    }
}
