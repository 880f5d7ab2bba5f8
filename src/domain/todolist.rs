//! Task list tools and resources backed by a shared [`TaskStore`]

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use rust_mcp_sdk::schema::{CallToolResult, ReadResourceResult};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        tasks::{timestamp, Task, TaskStatus, TaskStats, TaskStore},
        utils::{parse_args, pretty_json, structured},
    },
    errors::{HandlerError, RegistryError},
    mcp::{
        registry::{
            text_resource, tool_result, Registry, ResourceMetadata, ResourceResolver, ToolHandler,
        },
        schema::{Field, SchemaMap, ValidatedArgs},
    },
};

fn status_field() -> Field {
    Field::enumeration(TaskStatus::ALL.iter().map(TaskStatus::as_str))
}

fn task_schema() -> SchemaMap {
    SchemaMap::new()
        .field("id", Field::string())
        .field("title", Field::string())
        .field("description", Field::string().optional())
        .field("status", status_field())
        .field("created_at", Field::string())
        .field("completed_at", Field::string().optional())
}

#[derive(Debug, Deserialize)]
struct CreateTaskArgs {
    title: String,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatedTask {
    id: String,
    title: String,
    status: TaskStatus,
}

struct CreateTask {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ToolHandler for CreateTask {
    async fn call(&self, args: ValidatedArgs) -> Result<CallToolResult, HandlerError> {
        let CreateTaskArgs { title, description } = parse_args(args)?;
        let task = self.store.create(title, description);

        let text = format!("Task created: \"{}\" (ID: {})", task.title, task.id);
        let output = CreatedTask {
            id: task.id,
            title: task.title,
            status: task.status,
        };
        Ok(tool_result(text, structured(&output)?))
    }
}

#[derive(Debug, Deserialize)]
struct UpdateStatusArgs {
    task_id: String,
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
struct UpdatedStatus {
    id: String,
    title: String,
    old_status: TaskStatus,
    new_status: TaskStatus,
}

struct UpdateTaskStatus {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ToolHandler for UpdateTaskStatus {
    async fn call(&self, args: ValidatedArgs) -> Result<CallToolResult, HandlerError> {
        let UpdateStatusArgs { task_id, status } = parse_args(args)?;
        let change = self.store.update_status(&task_id, status)?;

        let text = format!(
            "Task \"{}\" moved from \"{}\" to \"{}\"",
            change.title,
            change.old_status.as_str(),
            change.new_status.as_str()
        );
        let output = UpdatedStatus {
            id: change.id,
            title: change.title,
            old_status: change.old_status,
            new_status: change.new_status,
        };
        Ok(tool_result(text, structured(&output)?))
    }
}

#[derive(Debug, Deserialize)]
struct DeleteTaskArgs {
    task_id: String,
}

#[derive(Debug, Serialize)]
struct DeletedTask {
    deleted: bool,
    title: String,
}

struct DeleteTask {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ToolHandler for DeleteTask {
    async fn call(&self, args: ValidatedArgs) -> Result<CallToolResult, HandlerError> {
        let DeleteTaskArgs { task_id } = parse_args(args)?;
        let task = self.store.delete(&task_id)?;

        let text = format!("Task deleted: \"{}\"", task.title);
        let output = DeletedTask {
            deleted: true,
            title: task.title,
        };
        Ok(tool_result(text, structured(&output)?))
    }
}

#[derive(Debug, Serialize)]
struct TaskList {
    tasks: Vec<Task>,
    total: usize,
}

struct ListTasks {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ToolHandler for ListTasks {
    async fn call(&self, _args: ValidatedArgs) -> Result<CallToolResult, HandlerError> {
        let tasks = self.store.newest_first();
        let output = TaskList {
            total: tasks.len(),
            tasks,
        };

        let text = format!("Full task list:\n{}", pretty_json(&output)?);
        Ok(tool_result(text, structured(&output)?))
    }
}

#[derive(Debug, Serialize)]
struct AllTasks {
    total: usize,
    tasks: Vec<Task>,
}

struct AllTasksResource {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ResourceResolver for AllTasksResource {
    async fn read(
        &self,
        uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<ReadResourceResult, HandlerError> {
        let tasks = self.store.newest_first();
        let body = AllTasks {
            total: tasks.len(),
            tasks,
        };
        Ok(text_resource(uri, "application/json", pretty_json(&body)?))
    }
}

#[derive(Debug, Serialize)]
struct TasksByStatus {
    status: TaskStatus,
    count: usize,
    tasks: Vec<Task>,
}

struct StatusResource {
    store: Arc<TaskStore>,
    status: TaskStatus,
}

#[async_trait]
impl ResourceResolver for StatusResource {
    async fn read(
        &self,
        uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<ReadResourceResult, HandlerError> {
        let tasks = self.store.with_status(self.status);
        let body = TasksByStatus {
            status: self.status,
            count: tasks.len(),
            tasks,
        };
        Ok(text_resource(uri, "application/json", pretty_json(&body)?))
    }
}

#[derive(Debug, Serialize)]
struct StatsSummary {
    #[serde(flatten)]
    stats: TaskStats,
    generated_at: String,
}

struct StatsResource {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ResourceResolver for StatsResource {
    async fn read(
        &self,
        uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<ReadResourceResult, HandlerError> {
        let body = StatsSummary {
            stats: self.store.stats(),
            generated_at: timestamp(&Utc::now()),
        };
        Ok(text_resource(uri, "application/json", pretty_json(&body)?))
    }
}

struct CsvExportResource {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ResourceResolver for CsvExportResource {
    async fn read(
        &self,
        uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<ReadResourceResult, HandlerError> {
        Ok(text_resource(uri, "text/csv", self.store.export_csv()))
    }
}

struct TaskDetailResource {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ResourceResolver for TaskDetailResource {
    async fn read(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
    ) -> Result<ReadResourceResult, HandlerError> {
        let task_id = params
            .get("task_id")
            .ok_or_else(|| HandlerError::new("missing task_id in resource uri"))?;
        let task = self
            .store
            .get(task_id)
            .ok_or_else(|| HandlerError::new(format!("task with id \"{task_id}\" not found")))?;

        Ok(text_resource(uri, "application/json", pretty_json(&task)?))
    }
}

pub fn register_todolist(registry: &mut Registry, store: Arc<TaskStore>) -> Result<(), RegistryError> {
    registry.register_tool(
        "create-task",
        SchemaMap::new()
            .field("title", Field::string().describe("Title of the task."))
            .field(
                "description",
                Field::string()
                    .optional()
                    .describe("Optional longer description."),
            ),
        Some(
            SchemaMap::new()
                .field("id", Field::string())
                .field("title", Field::string())
                .field("status", status_field()),
        ),
        "Create a new task with status todo.",
        Arc::new(CreateTask {
            store: Arc::clone(&store),
        }),
    )?;

    registry.register_tool(
        "update-task-status",
        SchemaMap::new()
            .field("task_id", Field::string().describe("Identifier of the task."))
            .field("status", status_field().describe("The new status.")),
        Some(
            SchemaMap::new()
                .field("id", Field::string())
                .field("title", Field::string())
                .field("old_status", status_field())
                .field("new_status", status_field()),
        ),
        "Change the status of an existing task.",
        Arc::new(UpdateTaskStatus {
            store: Arc::clone(&store),
        }),
    )?;

    registry.register_tool(
        "delete-task",
        SchemaMap::new().field("task_id", Field::string().describe("Identifier of the task.")),
        Some(
            SchemaMap::new()
                .field("deleted", Field::boolean())
                .field("title", Field::string()),
        ),
        "Delete a task.",
        Arc::new(DeleteTask {
            store: Arc::clone(&store),
        }),
    )?;

    registry.register_tool(
        "list-tasks",
        SchemaMap::new(),
        Some(
            SchemaMap::new()
                .field("tasks", Field::array(Field::object(task_schema())))
                .field("total", Field::number()),
        ),
        "List every task, newest first.",
        Arc::new(ListTasks {
            store: Arc::clone(&store),
        }),
    )?;

    registry.register_resource(
        "tasks-all",
        "todo://tasks/all",
        ResourceMetadata::json()
            .title("All tasks")
            .description("Every task, newest first."),
        Arc::new(AllTasksResource {
            store: Arc::clone(&store),
        }),
    )?;

    for status in TaskStatus::ALL {
        registry.register_resource(
            format!("tasks-{}", status.as_str()),
            &format!("todo://tasks/status/{}", status.as_str()),
            ResourceMetadata::json()
                .title(format!("Tasks: {}", status.as_str()))
                .description(format!("Tasks whose status is {}.", status.as_str())),
            Arc::new(StatusResource {
                store: Arc::clone(&store),
                status,
            }),
        )?;
    }

    registry.register_resource(
        "stats-summary",
        "todo://stats/summary",
        ResourceMetadata::json()
            .title("Task statistics")
            .description("Counts per status and completion rate."),
        Arc::new(StatsResource {
            store: Arc::clone(&store),
        }),
    )?;

    registry.register_resource(
        "export-csv",
        "todo://export/csv",
        ResourceMetadata::new("text/csv")
            .title("CSV export")
            .description("All tasks as comma-separated values."),
        Arc::new(CsvExportResource {
            store: Arc::clone(&store),
        }),
    )?;

    registry.register_resource(
        "task-detail",
        "todo://tasks/{task_id}",
        ResourceMetadata::json()
            .title("Task detail")
            .description("A single task by identifier."),
        Arc::new(TaskDetailResource { store }),
    )
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use rust_mcp_sdk::schema::ReadResourceResult;
    use serde_json::{json, Map, Value};

    use super::register_todolist;
    use crate::{
        domain::tasks::{TaskStatus, TaskStore},
        mcp::registry::Registry,
    };

    fn setup() -> (Registry, Arc<TaskStore>) {
        let store = Arc::new(TaskStore::seeded());
        let mut registry = Registry::new();
        register_todolist(&mut registry, Arc::clone(&store)).expect("registration");
        (registry, store)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    async fn read_json(registry: &Registry, uri: &str) -> Value {
        let matched = registry.resolve_resource(uri).expect("resource");
        let result = matched
            .entry
            .resolver
            .read(uri, &matched.params)
            .await
            .expect("read");
        resource_text(result)
            .parse::<Value>()
            .expect("json resource body")
    }

    fn resource_text(result: ReadResourceResult) -> String {
        let value = serde_json::to_value(&result).expect("serialize");
        value["contents"][0]["text"]
            .as_str()
            .expect("text contents")
            .to_string()
    }

    #[test]
    fn registers_tools_and_resources_in_order() {
        let (registry, _) = setup();

        let tools: Vec<&str> = registry.tools().map(|tool| tool.name.as_str()).collect();
        assert_eq!(
            tools,
            ["create-task", "update-task-status", "delete-task", "list-tasks"]
        );

        let resources: Vec<&str> = registry
            .resources()
            .map(|entry| entry.uri.as_str())
            .collect();
        assert_eq!(
            resources,
            [
                "todo://tasks/all",
                "todo://tasks/status/todo",
                "todo://tasks/status/in-progress",
                "todo://tasks/status/done",
                "todo://stats/summary",
                "todo://export/csv",
            ]
        );

        let templates: Vec<&str> = registry
            .resource_templates()
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(templates, ["task-detail"]);
    }

    #[tokio::test]
    async fn create_task_returns_todo_summary() {
        let (registry, store) = setup();
        let tool = registry.resolve_tool("create-task").expect("tool");

        let result = tool
            .handler
            .call(args(json!({ "title": "Review PR" })))
            .await
            .expect("created");
        let output = result.structured_content.expect("structured");

        assert_eq!(output["title"], "Review PR");
        assert_eq!(output["status"], "todo");
        let id = output["id"].as_str().expect("id");
        assert!(store.get(id).is_some());
    }

    #[tokio::test]
    async fn update_unknown_task_is_a_fault() {
        let (registry, store) = setup();
        let tool = registry.resolve_tool("update-task-status").expect("tool");

        let error = tool
            .handler
            .call(args(json!({ "task_id": "task-404", "status": "done" })))
            .await
            .expect_err("unknown task");
        assert_eq!(error.message, "task with id \"task-404\" not found");
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn update_reports_old_and_new_status() {
        let (registry, store) = setup();
        let tool = registry.resolve_tool("update-task-status").expect("tool");

        let result = tool
            .handler
            .call(args(json!({ "task_id": "task-2", "status": "in-progress" })))
            .await
            .expect("updated");
        let output = result.structured_content.expect("structured");

        assert_eq!(output["old_status"], "todo");
        assert_eq!(output["new_status"], "in-progress");
        assert_eq!(
            store.get("task-2").map(|task| task.status),
            Some(TaskStatus::InProgress)
        );
    }

    #[tokio::test]
    async fn list_tasks_is_sorted_without_mutating_the_store() {
        let (registry, store) = setup();
        let tool = registry.resolve_tool("list-tasks").expect("tool");

        let result = tool.handler.call(Map::new()).await.expect("listed");
        let output = result.structured_content.expect("structured");

        assert_eq!(output["total"], 3);
        assert_eq!(output["tasks"][0]["id"], "task-2");
        assert!(output["tasks"][0].get("completed_at").is_none());
        let first_row = store.export_csv().lines().nth(1).map(str::to_string);
        assert!(first_row.is_some_and(|row| row.starts_with("\"task-1\"")));
    }

    #[tokio::test]
    async fn status_resources_filter_tasks() {
        let (registry, _) = setup();
        let body = read_json(&registry, "todo://tasks/status/done").await;

        assert_eq!(body["status"], "done");
        assert_eq!(body["count"], 1);
        assert_eq!(body["tasks"][0]["id"], "task-3");
    }

    #[tokio::test]
    async fn stats_summary_includes_generation_time() {
        let (registry, _) = setup();
        let body = read_json(&registry, "todo://stats/summary").await;

        assert_eq!(body["total_tasks"], 3);
        assert_eq!(body["by_status"]["in_progress"], 1);
        assert_eq!(body["completion_rate_percent"], 33);
        assert!(body["generated_at"].is_string());
    }

    #[tokio::test]
    async fn task_detail_reads_through_the_template() {
        let (registry, _) = setup();
        let body = read_json(&registry, "todo://tasks/task-3").await;
        assert_eq!(body["id"], "task-3");
        assert_eq!(body["status"], "done");

        let matched = registry
            .resolve_resource("todo://tasks/task-404")
            .expect("template match");
        let error = matched
            .entry
            .resolver
            .read("todo://tasks/task-404", &matched.params)
            .await
            .expect_err("unknown task");
        assert_eq!(error.message, "task with id \"task-404\" not found");
    }

    #[tokio::test]
    async fn csv_export_is_plain_text() {
        let (registry, _) = setup();
        let matched = registry
            .resolve_resource("todo://export/csv")
            .expect("resource");
        let result = matched
            .entry
            .resolver
            .read("todo://export/csv", &HashMap::new())
            .await
            .expect("read");

        let text = resource_text(result);
        assert!(text.starts_with("id,title,description,status,created_at,completed_at\n"));
        assert_eq!(text.lines().count(), 4);
    }
}
