//! Task endpoints: create/list/get, SSE event stream, cancel, approval rules.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use conduit_core::orchestrator::Task;
use futures::stream::{self, Stream, StreamExt};

use crate::error::AppError;
use crate::types::{
    AddApprovalRuleRequest, AddApprovalRuleResponse, CreateTaskRequest, ListTasksQuery,
    TaskStatusResponse,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_task).get(list_tasks))
        .route("/:id", get(get_task))
        .route("/:id/events", get(task_events))
        .route("/:id/cancel", post(cancel_task))
        .route("/:id/approval-rules", post(add_approval_rule))
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    let task = state
        .orchestrator
        .create(body.prompt.clone(), body.requester_id, body.channel_id)?;

    let agent_loop = state.agent_loop.clone();
    let task_id = task.id.clone();
    let prompt = body.prompt;
    tokio::spawn(async move {
        agent_loop.run(task_id, prompt).await;
    });

    Ok(Json(TaskStatusResponse { task_id: task.id, status: task.status }))
}

async fn list_tasks(State(state): State<AppState>, Query(query): Query<ListTasksQuery>) -> Json<Vec<Task>> {
    Json(state.orchestrator.list(query.requester_id.as_deref()))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Task>, AppError> {
    state
        .orchestrator
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("unknown task \"{id}\"")))
}

async fn task_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (replay, rx) = state
        .orchestrator
        .subscribe(&id)
        .ok_or_else(|| AppError::NotFound(format!("unknown task \"{id}\"")))?;

    let replayed = stream::iter(replay);
    let followed = tokio_stream::wrappers::UnboundedReceiverStream::new(rx);

    let mut done = false;
    let events = replayed
        .chain(followed)
        .take_while(move |event| {
            let take = !done;
            if event.is_terminal() {
                done = true;
            }
            futures::future::ready(take)
        })
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "null".to_string());
            Ok(Event::default().event(event.type_name()).data(data))
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    state.orchestrator.cancel(&id)?;
    let task = state
        .orchestrator
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("unknown task \"{id}\"")))?;
    Ok(Json(TaskStatusResponse { task_id: task.id, status: task.status }))
}

async fn add_approval_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AddApprovalRuleRequest>,
) -> Result<Json<AddApprovalRuleResponse>, AppError> {
    if state.orchestrator.get(&id).is_none() {
        return Err(AppError::NotFound(format!("unknown task \"{id}\"")));
    }

    let before: std::collections::HashSet<String> =
        state.approvals.list_pending(Some(&id)).into_iter().map(|p| p.call_id).collect();

    state.approvals.add_rule(
        &id,
        conduit_core::approval::ApprovalRule {
            tool_path: body.tool_path,
            field: body.field,
            operator: body.operator,
            value: body.value,
            decision: body.decision,
        },
    );

    let after: std::collections::HashSet<String> =
        state.approvals.list_pending(Some(&id)).into_iter().map(|p| p.call_id).collect();
    let resolved = before.difference(&after).next().is_some();

    Ok(Json(AddApprovalRuleResponse { rule_id: uuid::Uuid::new_v4().to_string(), resolved }))
}
