use super::*;

#[test]
fn credentials_require_both_fields() {
    assert!(Credentials::new("alice", "pw1").is_complete());
    assert!(!Credentials::new("", "pw1").is_complete());
    assert!(!Credentials::new("alice", "").is_complete());
}

#[test]
fn credentials_debug_never_prints_password() {
    let rendered = format!("{:?}", Credentials::new("alice", "hunter2"));
    assert!(rendered.contains("alice"));
    assert!(!rendered.contains("hunter2"));
}

#[test]
fn session_debug_only_shows_token_prefix() {
    let session = Session::new("abcdefghijklmnop", Utc::now());
    let rendered = format!("{session:?}");
    assert!(rendered.contains("abcdef"));
    assert!(!rendered.contains("abcdefghijklmnop"));
}

#[test]
fn known_roles_parse_case_insensitively_and_unknown_roles_are_kept() {
    assert_eq!(Role::from("USER"), Role::User);
    assert_eq!(Role::from("admin"), Role::Admin);
    assert_eq!(Role::from("AUDITOR"), Role::Other("AUDITOR".to_string()));
    assert_eq!(String::from(Role::Admin), "ADMIN");
}

#[test]
fn profile_tolerates_missing_and_null_fields() {
    let profile: Profile =
        serde_json::from_str(r#"{"username":"alice","email":null,"role":"USER"}"#)
            .expect("profile");
    assert_eq!(profile.username, "alice");
    assert_eq!(profile.email, "");
    assert_eq!(profile.id, "");
    assert_eq!(profile.role, Role::User);
    assert!(!profile.is_active);
    assert_eq!(profile.created_at, None);
}

#[test]
fn profile_accepts_numeric_ids_and_zone_less_timestamps() {
    let profile: Profile = serde_json::from_str(
        r#"{"id":42,"username":"bob","role":"ADMIN","isActive":true,"createdAt":"2024-03-05T10:15:30"}"#,
    )
    .expect("profile");
    assert_eq!(profile.id, "42");
    assert!(profile.is_active);
    assert_eq!(profile.member_since(), "March 5, 2024");
    assert_eq!(profile.status_label(), "Active");
}

#[test]
fn unparsable_created_at_falls_back_to_not_available() {
    let profile: Profile =
        serde_json::from_str(r#"{"username":"bob","createdAt":[2024,3,5]}"#).expect("profile");
    assert_eq!(profile.created_at, None);
    assert_eq!(profile.member_since(), "Not available");
}

#[test]
fn cached_profile_survives_serialization_to_the_cache_format() {
    let profile = Profile {
        id: "7".to_string(),
        username: "carol".to_string(),
        email: "carol@example.com".to_string(),
        role: Role::Other("AUDITOR".to_string()),
        is_active: true,
        created_at: crate::lenient::parse_timestamp("2024-01-01T00:00:00Z"),
    };
    let raw = serde_json::to_string(&profile).expect("serialize");
    assert!(raw.contains(r#""isActive":true"#));
    let restored: Profile = serde_json::from_str(&raw).expect("deserialize");
    assert_eq!(restored, profile);
}

#[test]
fn only_authenticated_and_degraded_states_own_a_session() {
    let profile = Profile::default();
    assert!(SessionState::authenticated(profile.clone(), Freshness::Cached).has_session());
    assert!(SessionState::degraded(profile).has_session());
    assert!(!SessionState::Unauthenticated.has_session());
    assert!(!SessionState::Authenticating.has_session());
    assert!(!SessionState::LoggedOut.has_session());
}
