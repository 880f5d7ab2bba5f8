//! In-memory task store shared by every request
//!
//! Each mutation runs inside one write-lock critical section, so a lookup
//! and the change it guards can never interleave with another request.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::HandlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Todo, Self::InProgress, Self::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_timestamp"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: String,
    pub title: String,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total_tasks: usize,
    pub by_status: StatusCounts,
    pub completion_rate_percent: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task with id \"{0}\" not found")]
    NotFound(String),
}

impl From<TaskError> for HandlerError {
    fn from(err: TaskError) -> Self {
        HandlerError::new(err.to_string())
    }
}

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<Vec<Task>>,
}

fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    /// The three tasks the demo server starts with.
    pub fn seeded() -> Self {
        Self::with_tasks(vec![
            Task {
                id: "task-1".to_string(),
                title: "Prepare the MCP presentation".to_string(),
                description: Some("Slides and demo for the workshop".to_string()),
                status: TaskStatus::InProgress,
                created_at: utc(2025, 12, 4, 9, 0),
                completed_at: None,
            },
            Task {
                id: "task-2".to_string(),
                title: "Test the resources".to_string(),
                description: Some("Check that the URIs work".to_string()),
                status: TaskStatus::Todo,
                created_at: utc(2025, 12, 4, 9, 30),
                completed_at: None,
            },
            Task {
                id: "task-3".to_string(),
                title: "API documentation".to_string(),
                description: Some("Write the usage examples".to_string()),
                status: TaskStatus::Done,
                created_at: utc(2025, 12, 3, 14, 0),
                completed_at: Some(utc(2025, 12, 4, 8, 45)),
            },
        ])
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Task>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Task>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, title: String, description: Option<String>) -> Task {
        let task = Task {
            id: format!("task-{}", Uuid::new_v4().simple()),
            title,
            description,
            status: TaskStatus::Todo,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.write().push(task.clone());
        task
    }

    pub fn update_status(&self, id: &str, status: TaskStatus) -> Result<StatusChange, TaskError> {
        let mut tasks = self.write();
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        let old_status = task.status;
        task.status = status;
        if status == TaskStatus::Done && old_status != TaskStatus::Done {
            task.completed_at = Some(Utc::now());
        }

        Ok(StatusChange {
            id: task.id.clone(),
            title: task.title.clone(),
            old_status,
            new_status: status,
        })
    }

    pub fn delete(&self, id: &str) -> Result<Task, TaskError> {
        let mut tasks = self.write();
        let index = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        Ok(tasks.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.read().iter().find(|task| task.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot ordered newest first. The stored order is left untouched.
    pub fn newest_first(&self) -> Vec<Task> {
        let mut tasks = self.read().clone();
        tasks.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        tasks
    }

    pub fn with_status(&self, status: TaskStatus) -> Vec<Task> {
        self.read()
            .iter()
            .filter(|task| task.status == status)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> TaskStats {
        let tasks = self.read();
        let count = |status: TaskStatus| tasks.iter().filter(|task| task.status == status).count();

        let total_tasks = tasks.len();
        let by_status = StatusCounts {
            todo: count(TaskStatus::Todo),
            in_progress: count(TaskStatus::InProgress),
            done: count(TaskStatus::Done),
        };
        let completion_rate_percent = if total_tasks == 0 {
            0
        } else {
            ((by_status.done as f64 / total_tasks as f64) * 100.0).round() as u32
        };

        TaskStats {
            total_tasks,
            by_status,
            completion_rate_percent,
        }
    }

    pub fn export_csv(&self) -> String {
        let header = "id,title,description,status,created_at,completed_at".to_string();
        let tasks = self.read();
        let rows = tasks.iter().map(|task| {
            [
                task.id.clone(),
                task.title.clone(),
                task.description.clone().unwrap_or_default(),
                task.status.as_str().to_string(),
                timestamp(&task.created_at),
                task.completed_at.as_ref().map(timestamp).unwrap_or_default(),
            ]
            .iter()
            .map(|field| csv_field(field))
            .collect::<Vec<_>>()
            .join(",")
        });

        std::iter::once(header)
            .chain(rows)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn serialize_timestamp<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp(value))
}

fn serialize_optional_timestamp<S: Serializer>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serialize_timestamp(value, serializer),
        None => serializer.serialize_none(),
    }
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, thread};

    use super::{timestamp, TaskError, TaskStatus, TaskStore};

    #[test]
    fn create_appends_todo_task() {
        let store = TaskStore::seeded();
        let task = store.create("Write tests".to_string(), None);

        assert!(task.id.starts_with("task-"));
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(store.len(), 4);
        assert_eq!(store.get(&task.id), Some(task));
    }

    #[test]
    fn created_ids_are_unique() {
        let store = TaskStore::new();
        let first = store.create("a".to_string(), None);
        let second = store.create("b".to_string(), None);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn update_to_done_sets_completion_time() {
        let store = TaskStore::seeded();
        let change = store
            .update_status("task-2", TaskStatus::Done)
            .expect("task exists");

        assert_eq!(change.old_status, TaskStatus::Todo);
        assert_eq!(change.new_status, TaskStatus::Done);
        let task = store.get("task-2").expect("task exists");
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn unknown_ids_leave_the_store_untouched() {
        let store = TaskStore::seeded();
        let before = store.newest_first();

        assert_eq!(
            store.update_status("task-404", TaskStatus::Done),
            Err(TaskError::NotFound("task-404".to_string()))
        );
        assert_eq!(
            store.delete("task-404"),
            Err(TaskError::NotFound("task-404".to_string()))
        );
        assert_eq!(store.newest_first(), before);
    }

    #[test]
    fn concurrent_creates_never_lose_a_task() {
        let store = Arc::new(TaskStore::seeded());

        let handles: Vec<_> = (0..16)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.create(format!("task from worker {worker}"), None).id)
            })
            .collect();
        let ids: HashSet<String> = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .collect();

        assert_eq!(ids.len(), 16);
        assert_eq!(store.len(), 3 + 16);
        assert!(ids.iter().all(|id| store.get(id).is_some()));
    }

    #[test]
    fn interleaved_creates_and_deletes_stay_consistent() {
        let store = Arc::new(TaskStore::seeded());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let kept = store.create(format!("kept {worker}"), None);
                    let dropped = store.create(format!("dropped {worker}"), None);
                    store.delete(&dropped.id).expect("own task exists");
                    (kept.id, dropped.id)
                })
            })
            .collect();
        let results: Vec<(String, String)> = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .collect();

        assert_eq!(store.len(), 3 + 8);
        for (kept, dropped) in &results {
            assert!(store.get(kept).is_some());
            assert!(store.get(dropped).is_none());
        }
        let remaining: HashSet<String> = store.newest_first().into_iter().map(|task| task.id).collect();
        assert_eq!(remaining.len(), store.len());
    }

    #[test]
    fn delete_removes_task() {
        let store = TaskStore::seeded();
        let deleted = store.delete("task-1").expect("task exists");

        assert_eq!(deleted.id, "task-1");
        assert_eq!(store.len(), 2);
        assert!(store.get("task-1").is_none());
    }

    #[test]
    fn newest_first_orders_by_creation_time() {
        let store = TaskStore::seeded();
        let ids: Vec<String> = store
            .newest_first()
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ids, ["task-2", "task-1", "task-3"]);
    }

    #[test]
    fn stats_round_completion_rate() {
        let store = TaskStore::seeded();
        let stats = store.stats();

        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.by_status.todo, 1);
        assert_eq!(stats.by_status.in_progress, 1);
        assert_eq!(stats.by_status.done, 1);
        assert_eq!(stats.completion_rate_percent, 33);
        assert_eq!(TaskStore::new().stats().completion_rate_percent, 0);
    }

    #[test]
    fn csv_export_quotes_every_field() {
        let store = TaskStore::new();
        store.create("Say \"hi\"".to_string(), Some("a, b".to_string()));

        let csv = store.export_csv();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,title,description,status,created_at,completed_at")
        );
        let row = lines.next().expect("one task row");
        assert!(row.contains("\"Say \"\"hi\"\"\",\"a, b\",\"todo\""));
        assert!(row.ends_with(",\"\""));
    }

    #[test]
    fn json_and_csv_share_one_timestamp_format() {
        let store = TaskStore::seeded();
        let task = store.get("task-3").expect("task exists");

        let json = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(json["created_at"], "2025-12-03T14:00:00.000Z");
        assert_eq!(json["completed_at"], "2025-12-04T08:45:00.000Z");

        let pending = serde_json::to_value(store.get("task-2").expect("task exists"))
            .expect("serialize task");
        assert!(pending.get("completed_at").is_none());

        let csv = store.export_csv();
        let row = csv
            .lines()
            .find(|line| line.starts_with("\"task-3\""))
            .expect("task-3 row");
        assert!(row.ends_with("\"2025-12-03T14:00:00.000Z\",\"2025-12-04T08:45:00.000Z\""));

        let created = store.create("Fresh".to_string(), None);
        let json = serde_json::to_value(&created).expect("serialize task");
        assert_eq!(json["created_at"], timestamp(&created.created_at).as_str());
        assert_eq!(json["created_at"].as_str().map(str::len), Some(24));
    }

    #[test]
    fn status_round_trips_through_wire_names() {
        assert_eq!(
            serde_json::from_value::<TaskStatus>(serde_json::json!("in-progress")).ok(),
            Some(TaskStatus::InProgress)
        );
        assert!(serde_json::from_value::<TaskStatus>(serde_json::json!("blocked")).is_err());
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).expect("serialize"),
            "in-progress"
        );
    }
}
