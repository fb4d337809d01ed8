//! The permission gate: the engine's only view of roles and rights.
//!
//! The engine never stores role data. It asks an injected [`PermissionGate`]
//! whether an actor may vote on, or administer, a subject.

use std::{collections::HashSet, future::Future};

use uuid::Uuid;

pub trait PermissionGate: Send + Sync {
  /// May `actor_id` cast, change or withdraw a ballot on `subject_id`?
  fn can_vote<'a>(
    &'a self,
    actor_id: &'a str,
    subject_id: Uuid,
  ) -> impl Future<Output = bool> + Send + 'a;

  /// May `actor_id` administer `subject_id`?
  ///
  /// Platform-wide rights (such as creating subjects) are asked for with
  /// [`Uuid::nil`] as the subject.
  fn can_administer<'a>(
    &'a self,
    actor_id: &'a str,
    subject_id: Uuid,
  ) -> impl Future<Output = bool> + Send + 'a;
}

/// A fixed role table: a set of administrators and an optional electorate.
///
/// Administrators may administer every subject. When `electorate` is `None`
/// any actor may vote; otherwise only its members may.
#[derive(Debug, Clone, Default)]
pub struct RoleGate {
  administrators: HashSet<String>,
  electorate:     Option<HashSet<String>>,
}

impl RoleGate {
  pub fn new<A, E>(administrators: A, electorate: Option<E>) -> Self
  where
    A: IntoIterator,
    A::Item: Into<String>,
    E: IntoIterator,
    E::Item: Into<String>,
  {
    Self {
      administrators: administrators.into_iter().map(Into::into).collect(),
      electorate:     electorate.map(|e| e.into_iter().map(Into::into).collect()),
    }
  }
}

impl PermissionGate for RoleGate {
  async fn can_vote<'a>(&'a self, actor_id: &'a str, _subject_id: Uuid) -> bool {
    match &self.electorate {
      Some(members) => members.contains(actor_id),
      None => !actor_id.is_empty(),
    }
  }

  async fn can_administer<'a>(&'a self, actor_id: &'a str, _subject_id: Uuid) -> bool {
    self.administrators.contains(actor_id)
  }
}
