//! In-memory entity storage.
//!
//! Stand-in for a real persistence layer: the service's interesting state
//! lives in the idempotency store, and users/tasks only need enough storage
//! for the routes to operate on.

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::types::{CreateUserRequest, Task, UpdateUserRequest, User};

/// Concurrent map-backed storage for users and their tasks.
#[derive(Debug, Default)]
pub struct UserRepo {
    users: DashMap<Uuid, User>,
    tasks: DashMap<Uuid, Task>,
}

impl UserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// All users, oldest first. UUIDv7 ids are timestamp-sortable.
    pub fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by_key(|user| user.user_id);
        users
    }

    pub fn get(&self, user_id: Uuid) -> Option<User> {
        self.users.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn create(&self, request: CreateUserRequest) -> User {
        let now = Utc::now();
        let user = User {
            user_id: Uuid::now_v7(),
            nome: request.nome,
            email: request.email,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.user_id, user.clone());
        user
    }

    pub fn update(&self, user_id: Uuid, request: UpdateUserRequest) -> Option<User> {
        self.users.get_mut(&user_id).map(|mut entry| {
            let user = entry.value_mut();
            user.nome = request.nome;
            user.email = request.email;
            user.updated_at = Utc::now();
            user.clone()
        })
    }

    /// Returns false when the user did not exist.
    pub fn delete(&self, user_id: Uuid) -> bool {
        let removed = self.users.remove(&user_id).is_some();
        if removed {
            self.tasks.retain(|_, task| task.user_id != user_id);
        }
        removed
    }

    pub fn tasks_for_user(&self, user_id: Uuid) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by_key(|task| task.task_id);
        tasks
    }

    pub fn add_task(&self, user_id: Uuid, descricao: impl Into<String>) -> Task {
        let task = Task {
            task_id: Uuid::now_v7(),
            user_id,
            descricao: descricao.into(),
            concluida: false,
        };
        self.tasks.insert(task.task_id, task.clone());
        task
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
