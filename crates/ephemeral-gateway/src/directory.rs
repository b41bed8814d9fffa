//! External directory seam
//!
//! The directory is the platform's guild/role/member graph reached over REST.
//! Implementations own transport retries and rate-limit handling; they report
//! failures already classified as [`DirectoryError`].

use std::future::Future;

use ephemeral_types::{Channel, DirectoryError, Guild, Member, Permissions, Role};

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Guild, role and member queries and mutations.
///
/// Implemented by the serenity-backed client in the bot and by
/// `MockDirectory` in tests.
pub trait Directory: Send + Sync + 'static {
    /// Guild metadata. Roles, channels and members may be left empty.
    fn guild(&self, guild_id: u64) -> impl Future<Output = DirectoryResult<Guild>> + Send;

    fn roles(&self, guild_id: u64) -> impl Future<Output = DirectoryResult<Vec<Role>>> + Send;

    fn channels(&self, guild_id: u64)
        -> impl Future<Output = DirectoryResult<Vec<Channel>>> + Send;

    /// One page of members ordered by user id, strictly after `after`.
    fn members(
        &self,
        guild_id: u64,
        after: Option<u64>,
        limit: u16,
    ) -> impl Future<Output = DirectoryResult<Vec<Member>>> + Send;

    /// Create a blank role. Name and color are applied by [`Directory::edit_role`].
    fn create_role(&self, guild_id: u64) -> impl Future<Output = DirectoryResult<Role>> + Send;

    fn edit_role(
        &self,
        guild_id: u64,
        role_id: u64,
        name: &str,
        color: u32,
    ) -> impl Future<Output = DirectoryResult<Role>> + Send;

    fn add_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn remove_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> impl Future<Output = DirectoryResult<()>> + Send;

    /// Effective permissions of `user_id` in `channel_id`.
    fn channel_permissions(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    ) -> impl Future<Output = DirectoryResult<Permissions>> + Send;
}
