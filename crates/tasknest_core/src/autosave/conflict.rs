//! Pluggable conflict resolution for stale updates.
//!
//! A conflict is an update whose `updated_at` is older than the copy held in
//! the last-known durable snapshot. Equal timestamps are not conflicts.

use super::operation::{find_task, Snapshot};
use crate::model::task::Task;
use futures::future::{self, BoxFuture, FutureExt};

/// Inputs handed to a resolver.
#[derive(Debug, Clone)]
pub struct ConflictContext {
    /// Task carried by the incoming update.
    pub incoming: Task,
    /// Client copy before the update, taken from the rollback snapshot.
    pub base: Option<Task>,
    /// Last-known durable collection.
    pub server: Snapshot,
}

impl ConflictContext {
    pub fn server_task(&self) -> Option<&Task> {
        find_task(&self.server, &self.incoming.id)
    }
}

pub trait ConflictResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produces the collection to persist.
    fn resolve(&self, context: ConflictContext) -> BoxFuture<'static, Vec<Task>>;
}

/// Incoming update replaces the stored copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientWins;

impl ConflictResolver for ClientWins {
    fn name(&self) -> &'static str {
        "client_wins"
    }

    fn resolve(&self, context: ConflictContext) -> BoxFuture<'static, Vec<Task>> {
        future::ready(replace_or_append(&context.server, context.incoming)).boxed()
    }
}

/// Stored collection is kept as-is; the incoming update is discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerWins;

impl ConflictResolver for ServerWins {
    fn name(&self) -> &'static str {
        "server_wins"
    }

    fn resolve(&self, context: ConflictContext) -> BoxFuture<'static, Vec<Task>> {
        future::ready(context.server.to_vec()).boxed()
    }
}

/// Field-level merge against the pre-update client copy.
///
/// Fields the client changed relative to `base` take the incoming value;
/// untouched fields keep the stored value. Without a base every field is
/// treated as changed. `updated_at` is the later of both copies.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreeWayMerge;

impl ConflictResolver for ThreeWayMerge {
    fn name(&self) -> &'static str {
        "three_way_merge"
    }

    fn resolve(&self, context: ConflictContext) -> BoxFuture<'static, Vec<Task>> {
        let merged = match context.server_task() {
            Some(server) => merge_task(context.base.as_ref(), server, &context.incoming),
            None => context.incoming.clone(),
        };
        future::ready(replace_or_append(&context.server, merged)).boxed()
    }
}

fn merge_task(base: Option<&Task>, server: &Task, incoming: &Task) -> Task {
    fn pick<T: Clone + PartialEq>(
        base: Option<&T>,
        server: &T,
        incoming: &T,
    ) -> T {
        match base {
            Some(base) if base == incoming => server.clone(),
            _ => incoming.clone(),
        }
    }

    Task {
        id: server.id.clone(),
        title: pick(base.map(|b| &b.title), &server.title, &incoming.title),
        description: pick(
            base.map(|b| &b.description),
            &server.description,
            &incoming.description,
        ),
        priority: pick(base.map(|b| &b.priority), &server.priority, &incoming.priority),
        status: pick(base.map(|b| &b.status), &server.status, &incoming.status),
        project: pick(base.map(|b| &b.project), &server.project, &incoming.project),
        created_at: server.created_at.min(incoming.created_at),
        updated_at: server.updated_at.max(incoming.updated_at),
    }
}

fn replace_or_append(server: &[Task], task: Task) -> Vec<Task> {
    let mut next = server.to_vec();
    match next.iter_mut().find(|existing| existing.id == task.id) {
        Some(slot) => *slot = task,
        None => next.push(task),
    }
    next
}

#[cfg(test)]
mod tests {
    use super::{ClientWins, ConflictContext, ConflictResolver, ServerWins, ThreeWayMerge};
    use crate::autosave::operation::Snapshot;
    use crate::model::task::{Priority, Project, Task, TaskStatus};

    fn context() -> ConflictContext {
        let base = Task {
            id: "t".to_string(),
            title: "draft".to_string(),
            description: None,
            priority: Priority::Low,
            status: TaskStatus::Todo,
            project: Project::Work,
            created_at: 100,
            updated_at: 100,
        };
        let server = Task {
            status: TaskStatus::Done,
            updated_at: 300,
            ..base.clone()
        };
        let incoming = Task {
            title: "final".to_string(),
            updated_at: 200,
            ..base.clone()
        };
        ConflictContext {
            incoming,
            base: Some(base),
            server: Snapshot::from(vec![server]),
        }
    }

    #[tokio::test]
    async fn client_wins_takes_incoming_copy() {
        let resolved = ClientWins.resolve(context()).await;
        assert_eq!(resolved[0].title, "final");
        assert_eq!(resolved[0].status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn server_wins_keeps_stored_copy() {
        let resolved = ServerWins.resolve(context()).await;
        assert_eq!(resolved[0].title, "draft");
        assert_eq!(resolved[0].status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn merge_combines_disjoint_field_changes() {
        let resolved = ThreeWayMerge.resolve(context()).await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].title, "final");
        assert_eq!(resolved[0].status, TaskStatus::Done);
        assert_eq!(resolved[0].updated_at, 300);
    }
}
