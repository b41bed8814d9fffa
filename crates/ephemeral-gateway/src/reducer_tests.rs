use super::*;

use ephemeral_types::{DirectoryError, DiscordErrorCode};

use crate::error::ErrorKind;
use crate::gateway::Gateway;
use crate::mock::{GuildBuilder, MockDirectory, MockOp};

const GUILD: u64 = 100;
const BOT: u64 = 9;
const BOT_ROLE: u64 = 200;
const GENERAL_ROLE: u64 = 201;
const MUSIC_ROLE: u64 = 202;
const MODERATOR_ROLE: u64 = 203;

const GENERAL: u64 = 300;
const STAFF: u64 = 301;
const MUSIC: u64 = 302;
const LOUNGE: u64 = 303;

fn fixture(name: &str) -> GuildBuilder {
    GuildBuilder::new(GUILD, name)
        .role(BOT_ROLE, "Ephemeral Roles")
        .role(GENERAL_ROLE, "{eph} General")
        .role(MUSIC_ROLE, "{eph} Music")
        .role(MODERATOR_ROLE, "Moderator")
        .voice_channel(GENERAL, "General")
        .hidden_channel(STAFF, "Staff", BOT_ROLE)
        .voice_channel(MUSIC, "Music")
        .voice_channel(LOUNGE, "Lounge")
        .member(7, "alice", &[GENERAL_ROLE, MODERATOR_ROLE])
        .member(8, "bob", &[])
        .bot(BOT, "Ephemeral Roles", &[BOT_ROLE])
}

fn reducer(directory: &MockDirectory) -> VoiceStateReducer<MockDirectory> {
    let reducer = VoiceStateReducer::new(Gateway::new(directory.clone()), ReducerConfig::default());
    reducer.set_bot_user_id(BOT);
    reducer
}

fn setup() -> (MockDirectory, VoiceStateReducer<MockDirectory>) {
    let directory = MockDirectory::new();
    directory.insert_guild(fixture("Test Guild").build());
    let reducer = reducer(&directory);
    (directory, reducer)
}

async fn reduce(
    reducer: &VoiceStateReducer<MockDirectory>,
    user_id: u64,
    old: Option<u64>,
    new: Option<u64>,
) -> Transition {
    reducer
        .reduce(&VoiceStateChange::new(user_id, GUILD, old, new))
        .await
        .unwrap()
        .expect("guild is not ignored")
}

#[tokio::test]
async fn test_join_creates_and_grants_role() {
    let (directory, reducer) = setup();

    let transition = reduce(&reducer, 8, None, Some(LOUNGE)).await;

    let role = match &transition.grant {
        GrantOutcome::Granted(role) => role.clone(),
        other => panic!("expected Granted, got {other:?}"),
    };
    assert_eq!(role.name, "{eph} Lounge");
    assert_eq!(role.color, DEFAULT_ROLE_COLOR);
    assert!(transition.revoked.is_empty());
    assert!(transition.is_clean());
    assert_eq!(transition.username, "bob");
    assert_eq!(directory.calls(MockOp::CreateRole), 1);
    assert_eq!(directory.member_roles(GUILD, 8), vec![role.id]);
}

#[tokio::test]
async fn test_join_existing_role_is_not_recreated() {
    let (directory, reducer) = setup();

    let transition = reduce(&reducer, 8, None, Some(MUSIC)).await;

    assert!(matches!(transition.grant, GrantOutcome::Granted(ref r) if r.id == MUSIC_ROLE));
    assert_eq!(directory.calls(MockOp::CreateRole), 0);
    assert_eq!(directory.member_roles(GUILD, 8), vec![MUSIC_ROLE]);
}

#[tokio::test]
async fn test_already_held_role_is_not_granted_again() {
    let (directory, reducer) = setup();

    let transition = reduce(&reducer, 7, Some(GENERAL), Some(GENERAL)).await;

    assert!(matches!(transition.grant, GrantOutcome::AlreadyHeld(ref r) if r.id == GENERAL_ROLE));
    assert!(transition.revoked.is_empty());
    assert_eq!(directory.calls(MockOp::AddMemberRole), 0);
    assert_eq!(directory.calls(MockOp::RemoveMemberRole), 0);
    assert_eq!(directory.calls(MockOp::CreateRole), 0);
}

#[tokio::test]
async fn test_move_revokes_old_and_grants_new() {
    let (directory, reducer) = setup();

    let transition = reduce(&reducer, 7, Some(GENERAL), Some(MUSIC)).await;

    assert_eq!(transition.revoked.len(), 1);
    assert_eq!(transition.revoked[0].role.id, GENERAL_ROLE);
    assert!(transition.revoked[0].result.is_ok());
    assert!(matches!(transition.grant, GrantOutcome::Granted(ref r) if r.id == MUSIC_ROLE));
    assert_eq!(
        directory.member_roles(GUILD, 7),
        vec![MODERATOR_ROLE, MUSIC_ROLE]
    );
}

#[tokio::test]
async fn test_leave_revokes_managed_roles_only() {
    let (directory, reducer) = setup();

    let transition = reduce(&reducer, 7, Some(GENERAL), None).await;

    assert!(matches!(transition.grant, GrantOutcome::NotRequested));
    assert_eq!(transition.revoked.len(), 1);
    assert_eq!(directory.member_roles(GUILD, 7), vec![MODERATOR_ROLE]);
    assert_eq!(directory.calls(MockOp::ChannelPermissions), 0);
}

#[tokio::test]
async fn test_hidden_channel_never_creates_role() {
    let (directory, reducer) = setup();

    let transition = reduce(&reducer, 8, None, Some(STAFF)).await;

    assert!(matches!(
        transition.grant,
        GrantOutcome::ChannelHidden { channel_id: STAFF }
    ));
    assert_eq!(directory.calls(MockOp::CreateRole), 0);
    assert_eq!(directory.roles_named(GUILD, "{eph} Staff"), 0);
    assert!(directory.member_roles(GUILD, 8).is_empty());
}

#[tokio::test]
async fn test_move_into_hidden_channel_still_revokes() {
    let (directory, reducer) = setup();

    let transition = reduce(&reducer, 7, Some(GENERAL), Some(STAFF)).await;

    assert_eq!(transition.revoked.len(), 1);
    assert!(matches!(transition.grant, GrantOutcome::ChannelHidden { .. }));
    assert_eq!(directory.member_roles(GUILD, 7), vec![MODERATOR_ROLE]);
}

#[tokio::test]
async fn test_revoke_failure_does_not_abort_grant() {
    let (directory, reducer) = setup();
    directory.fail(
        MockOp::RemoveMemberRole,
        DirectoryError::new(DiscordErrorCode::MissingPermissions, "Missing Permissions")
            .with_response(403, 50013),
    );

    let transition = reduce(&reducer, 7, Some(GENERAL), Some(LOUNGE)).await;

    assert_eq!(transition.revoked.len(), 1);
    let err = transition.revoked[0].result.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(matches!(transition.grant, GrantOutcome::Granted(ref r) if r.name == "{eph} Lounge"));
    assert!(!transition.is_clean());

    let roles = directory.member_roles(GUILD, 7);
    assert!(roles.contains(&GENERAL_ROLE));
    assert_eq!(roles.len(), 3);
}

#[tokio::test]
async fn test_grant_failure_is_reported() {
    let (directory, reducer) = setup();
    directory.fail(
        MockOp::CreateRole,
        DirectoryError::new(DiscordErrorCode::MaxRolesReached, "Maximum number of guild roles reached")
            .with_response(400, 30005),
    );

    let transition = reduce(&reducer, 7, Some(GENERAL), Some(LOUNGE)).await;

    assert!(transition.revoked[0].result.is_ok());
    match &transition.grant {
        GrantOutcome::Failed { role_name, error } => {
            assert_eq!(role_name, "{eph} Lounge");
            assert_eq!(error.kind(), ErrorKind::RateLimited);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_joins_share_created_role() {
    let directory = MockDirectory::new().with_latency(std::time::Duration::from_millis(5));
    let mut builder = fixture("Test Guild");
    for user_id in 20..25 {
        builder = builder.member(user_id, &format!("user-{user_id}"), &[]);
    }
    directory.insert_guild(builder.build());
    let reducer = reducer(&directory);

    let joins = (20..25).map(|user_id| {
        let change = VoiceStateChange::new(user_id, GUILD, None, Some(LOUNGE));
        let reducer = &reducer;
        async move { reducer.reduce(&change).await }
    });
    let results = futures::future::join_all(joins).await;

    assert_eq!(directory.calls(MockOp::CreateRole), 1);
    assert_eq!(directory.roles_named(GUILD, "{eph} Lounge"), 1);
    for result in results {
        let transition = result.unwrap().unwrap();
        assert!(matches!(transition.grant, GrantOutcome::Granted(_)));
    }
}

#[tokio::test]
async fn test_ignored_guild_is_skipped() {
    let directory = MockDirectory::new();
    directory.insert_guild(fixture(DEFAULT_IGNORED_GUILD).build());
    let reducer = reducer(&directory);

    let outcome = reducer
        .reduce(&VoiceStateChange::new(8, GUILD, None, Some(LOUNGE)))
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert_eq!(directory.calls(MockOp::ChannelPermissions), 0);
    assert_eq!(directory.calls(MockOp::CreateRole), 0);
}

#[tokio::test]
async fn test_unknown_member_is_not_found() {
    let (directory, reducer) = setup();

    let err = reducer
        .reduce(&VoiceStateChange::new(4242, GUILD, None, Some(LOUNGE)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(directory.calls(MockOp::CreateRole), 0);
}

#[tokio::test]
async fn test_unknown_channel_is_not_found() {
    let (_directory, reducer) = setup();

    let err = reducer
        .reduce(&VoiceStateChange::new(8, GUILD, None, Some(999)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::NotFound {
            entity: "channel",
            id: 999
        }
    ));
}

#[tokio::test]
async fn test_unknown_guild_is_not_found() {
    let (_directory, reducer) = setup();

    let err = reducer
        .reduce(&VoiceStateChange {
            guild_id: 555,
            ..VoiceStateChange::new(8, GUILD, None, Some(LOUNGE))
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_join_before_ready_fails() {
    let directory = MockDirectory::new();
    directory.insert_guild(fixture("Test Guild").build());
    let reducer = VoiceStateReducer::new(Gateway::new(directory.clone()), ReducerConfig::default());

    let err = reducer
        .reduce(&VoiceStateChange::new(8, GUILD, None, Some(LOUNGE)))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Internal(_)));
    assert_eq!(directory.calls(MockOp::CreateRole), 0);
}

#[tokio::test]
async fn test_custom_prefix() {
    let directory = MockDirectory::new();
    directory.insert_guild(fixture("Test Guild").build());
    let config = ReducerConfig {
        role_prefix: "~vc".to_string(),
        ..ReducerConfig::default()
    };
    let reducer = VoiceStateReducer::new(Gateway::new(directory.clone()), config);
    reducer.set_bot_user_id(BOT);

    // {eph} roles are not managed under this prefix, so nothing is revoked.
    let transition = reduce(&reducer, 7, Some(GENERAL), Some(MUSIC)).await;

    assert!(transition.revoked.is_empty());
    assert!(matches!(transition.grant, GrantOutcome::Granted(ref r) if r.name == "~vc Music"));
}
