//! # Resource Dispatcher
//!
//! Binds a [`Resource`] to up to five endpoints under a prefix `P`:
//!
//! | Method | Path | Capability |
//! |--------|------|------------|
//! | GET    | `P/list` | [`List`] |
//! | GET    | `P/:id`  | [`Get`] |
//! | POST   | `P`      | [`Create`] |
//! | PUT    | `P/:id`  | [`Update`] |
//! | DELETE | `P/:id`  | [`Get`] + [`Delete`] |
//!
//! Every endpoint runs its gate pipeline on the request head first; an
//! abort is returned as-is and nothing below runs. The entity call itself
//! runs on a detached task, so a write that has started completes even if
//! the client goes away. The transport token in the [`RequestContext`] is
//! cancelled when the handler is dropped, which lets storage reads stop
//! early.
//!
//! Dispatcher responses echo the request's `X-Trace-Id`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Request};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, RequestPartsExt, Router};
use gatekit_core::{
    Create, Delete, Get, List, ListQuery, PathParams, RequestContext, Resource, ResourceError,
    TraceId, Update, Verb,
};

use crate::envelope::{DataEnvelope, ErrorEnvelope, ItemEnvelope, ListEnvelope};
use crate::error::{AppError, MessageBody};
use crate::pipeline::{Pipeline, Stage};

/// Default name of the item path parameter.
pub const DEFAULT_ID_PARAM: &str = "id";

/// Largest accepted create/update body.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Endpoint registration for one resource.
///
/// Stages added with [`stage`](Self::stage) apply to the endpoints
/// registered after them, in order.
pub struct ResourceRoutes<R: Resource> {
    prefix: String,
    resource: Arc<R>,
    pipeline: Pipeline,
    id_param: Arc<str>,
    router: Router,
}

impl<R: Resource> std::fmt::Debug for ResourceRoutes<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRoutes")
            .field("prefix", &self.prefix)
            .field("resource", &self.resource.name())
            .field("pipeline", &self.pipeline)
            .field("id_param", &self.id_param)
            .finish()
    }
}

impl<R: Resource> ResourceRoutes<R> {
    /// `prefix` is a route path such as `/widgets` or
    /// `/widgets/:widget_id/parts`. `pipeline` is the base gate chain; a
    /// [`TraceStage`](crate::gates::TraceStage) is put in front of it if
    /// it does not start with one.
    pub fn new(prefix: impl Into<String>, resource: R, pipeline: Pipeline) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches('/').to_string();
        Self {
            prefix,
            resource: Arc::new(resource),
            pipeline: pipeline.traced(),
            id_param: Arc::from(DEFAULT_ID_PARAM),
            router: Router::new(),
        }
    }

    /// Rename the item parameter (`P/:name`). Needed when child resources
    /// are mounted below `P/:name/...`, since sibling routes must agree on
    /// parameter names.
    pub fn id_param(mut self, name: &str) -> Self {
        self.id_param = Arc::from(name);
        self
    }

    /// Append a stage for the endpoints registered from here on.
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.pipeline = self.pipeline.stage(stage);
        self
    }

    fn endpoint(&self) -> Endpoint<R> {
        Endpoint {
            resource: self.resource.clone(),
            pipeline: self.pipeline.clone(),
            id_param: self.id_param.clone(),
        }
    }

    fn item_path(&self) -> String {
        format!("{}/:{}", self.prefix, self.id_param)
    }

    fn collection_path(&self) -> String {
        if self.prefix.is_empty() {
            "/".to_string()
        } else {
            self.prefix.clone()
        }
    }

    /// `GET P/list`
    pub fn list(mut self) -> Self
    where
        R: List,
    {
        let ep = self.endpoint();
        let path = format!("{}/list", self.prefix);
        self.router = self.router.route(
            &path,
            get(move |req: Request| list_endpoint(ep.clone(), req)),
        );
        self
    }

    /// `GET P/:id`
    pub fn get(mut self) -> Self
    where
        R: Get,
    {
        let ep = self.endpoint();
        let path = self.item_path();
        self.router = self.router.route(
            &path,
            get(move |req: Request| get_endpoint(ep.clone(), req)),
        );
        self
    }

    /// `POST P`
    pub fn create(mut self) -> Self
    where
        R: Create,
    {
        let ep = self.endpoint();
        let path = self.collection_path();
        self.router = self.router.route(
            &path,
            post(move |req: Request| create_endpoint(ep.clone(), req)),
        );
        self
    }

    /// `PUT P/:id`
    pub fn update(mut self) -> Self
    where
        R: Update,
    {
        let ep = self.endpoint();
        let path = self.item_path();
        self.router = self.router.route(
            &path,
            put(move |req: Request| update_endpoint(ep.clone(), req)),
        );
        self
    }

    /// `DELETE P/:id`
    pub fn delete(mut self) -> Self
    where
        R: Get + Delete,
    {
        let ep = self.endpoint();
        let path = self.item_path();
        self.router = self.router.route(
            &path,
            delete(move |req: Request| delete_endpoint(ep.clone(), req)),
        );
        self
    }

    /// All five endpoints.
    pub fn crud(self) -> Self
    where
        R: List + Get + Create + Update + Delete,
    {
        self.list().get().create().update().delete()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

struct Endpoint<R> {
    resource: Arc<R>,
    pipeline: Pipeline,
    id_param: Arc<str>,
}

impl<R> Clone for Endpoint<R> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            pipeline: self.pipeline.clone(),
            id_param: self.id_param.clone(),
        }
    }
}

/// Request head after the gates passed.
struct Admitted {
    parts: Parts,
    params: PathParams,
    ctx: RequestContext,
}

impl<R: Resource> Endpoint<R> {
    async fn admit(&self, mut parts: Parts) -> Result<Admitted, Response> {
        let params: PathParams = parts
            .extract::<Path<HashMap<String, String>>>()
            .await
            .map(|Path(map)| map.into_iter().collect())
            .unwrap_or_default();
        let mut ctx = self.pipeline.run(&parts).await?;
        ctx.set_params(params.clone());
        Ok(Admitted { parts, params, ctx })
    }

    fn item_id(&self, params: &PathParams) -> String {
        params.get(&self.id_param).unwrap_or_default().to_string()
    }
}

/// Run entity work on its own task so that dropping the handler does not
/// drop the work.
async fn detach<F, T>(work: F) -> Result<T, AppError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(format!("entity task failed: {e}")))
}

fn with_trace(mut response: Response, trace_id: &TraceId) -> Response {
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-trace-id"), value);
    }
    response
}

fn status_of(err: &ResourceError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn read_body(body: axum::body::Body) -> Result<axum::body::Bytes, ResourceError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ResourceError::Unprocessable(format!("can not read request body: {e}")))
}

async fn list_endpoint<R: List>(ep: Endpoint<R>, req: Request) -> Response {
    let (parts, _body) = req.into_parts();
    let Admitted { parts, params, ctx } = match ep.admit(parts).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let trace_id = ctx.trace_id().clone();
    let _disconnect = ctx.disconnect_token().clone().drop_guard();

    let query = match ListQuery::parse(parts.uri.query()) {
        Ok(query) => query,
        Err(e) => {
            tracing::warn!(%trace_id, entity = ep.resource.name(), error = %e, "invalid list query");
            return with_trace(AppError::from(e).into_response(), &trace_id);
        }
    };
    let filters = ep.resource.filter_params(&params);

    let resource = ep.resource.clone();
    let result = detach(async move { resource.list(&query, &ctx, &filters).await }).await;

    let response = match result {
        Ok(Ok(page)) => Json(ListEnvelope::ok(page.items, page.total)).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(%trace_id, entity = ep.resource.name(), error = %e, "list failed");
            Json(ListEnvelope::<R::Model>::failed(e.to_string())).into_response()
        }
        Err(e) => e.into_response(),
    };
    with_trace(response, &trace_id)
}

async fn get_endpoint<R: Get>(ep: Endpoint<R>, req: Request) -> Response {
    let (parts, _body) = req.into_parts();
    let Admitted { params, ctx, .. } = match ep.admit(parts).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let trace_id = ctx.trace_id().clone();
    let _disconnect = ctx.disconnect_token().clone().drop_guard();
    let id = ep.item_id(&params);

    let resource = ep.resource.clone();
    let result = detach(async move { resource.get(&id, &ctx).await }).await;

    let response = match result {
        Ok(Ok(model)) => Json(ItemEnvelope::ok(model)).into_response(),
        Ok(Err(e)) => {
            tracing::debug!(%trace_id, entity = ep.resource.name(), error = %e, "get failed");
            (status_of(&e), Json(ItemEnvelope::<R::Model>::failed(e.to_string()))).into_response()
        }
        Err(e) => e.into_response(),
    };
    with_trace(response, &trace_id)
}

fn unprocessable(trace_id: &TraceId, entity: &str, err: ResourceError) -> Response {
    tracing::warn!(%trace_id, entity, error = %err, "payload rejected");
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorEnvelope {
            error: err.to_string(),
        }),
    )
        .into_response()
}

async fn create_endpoint<R: Create>(ep: Endpoint<R>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let Admitted { params, ctx, .. } = match ep.admit(parts).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let trace_id = ctx.trace_id().clone();
    let _disconnect = ctx.disconnect_token().clone().drop_guard();
    let entity = ep.resource.name();

    let model = match read_body(body).await.and_then(|bytes| {
        ep.resource
            .decode(&bytes, &params)
            .and_then(|decoded| decoded.into_model_for(Verb::Create))
    }) {
        Ok(model) => model,
        Err(e) => return with_trace(unprocessable(&trace_id, entity, e), &trace_id),
    };

    let resource = ep.resource.clone();
    let result = detach(async move { resource.create(model, &ctx).await }).await;

    let response = match result {
        Ok(Ok(model)) => Json(DataEnvelope { data: model }).into_response(),
        Ok(Err(e)) => unprocessable(&trace_id, entity, e),
        Err(e) => e.into_response(),
    };
    with_trace(response, &trace_id)
}

async fn update_endpoint<R: Update>(ep: Endpoint<R>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let Admitted { params, ctx, .. } = match ep.admit(parts).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let trace_id = ctx.trace_id().clone();
    let _disconnect = ctx.disconnect_token().clone().drop_guard();
    let entity = ep.resource.name();
    let id = ep.item_id(&params);

    let model = match read_body(body).await.and_then(|bytes| {
        ep.resource
            .decode(&bytes, &params)
            .and_then(|decoded| decoded.into_model_for(Verb::Update))
    }) {
        Ok(model) => model,
        Err(e) => return with_trace(unprocessable(&trace_id, entity, e), &trace_id),
    };

    let resource = ep.resource.clone();
    let result = detach(async move { resource.update(&id, model, &ctx).await }).await;

    let response = match result {
        Ok(Ok(model)) => Json(DataEnvelope { data: model }).into_response(),
        Ok(Err(e)) => unprocessable(&trace_id, entity, e),
        Err(e) => e.into_response(),
    };
    with_trace(response, &trace_id)
}

async fn delete_endpoint<R: Get + Delete>(ep: Endpoint<R>, req: Request) -> Response {
    let (parts, _body) = req.into_parts();
    let Admitted { params, ctx, .. } = match ep.admit(parts).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let trace_id = ctx.trace_id().clone();
    let _disconnect = ctx.disconnect_token().clone().drop_guard();
    let id = ep.item_id(&params);
    let missing = format!("{} {id} not deleted", ep.resource.name());

    let resource = ep.resource.clone();
    let result = detach(async move {
        resource.get(&id, &ctx).await?;
        resource.delete(&id, &ctx).await
    })
    .await;

    let response = match result {
        Ok(Ok(true)) => Json(MessageBody::new("ok")).into_response(),
        Ok(Ok(false)) => (StatusCode::NOT_FOUND, Json(MessageBody::new(missing))).into_response(),
        Ok(Err(e)) => {
            tracing::debug!(%trace_id, entity = ep.resource.name(), error = %e, "delete refused");
            (StatusCode::NOT_FOUND, Json(MessageBody::new(e.to_string()))).into_response()
        }
        Err(e) => e.into_response(),
    };
    with_trace(response, &trace_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Method;
    use gatekit_core::{Decoded, FilterParam, MemoryStore, Page, Record};
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    use crate::pipeline::{Flow, GateRequest};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(default)]
        id: u64,
        #[serde(default)]
        book_id: u64,
        text: String,
    }

    impl Record for Note {
        fn id(&self) -> u64 {
            self.id
        }
        fn set_id(&mut self, id: u64) {
            self.id = id;
        }
    }

    #[derive(Default, Clone)]
    struct Notes {
        store: MemoryStore<Note>,
        calls: Arc<AtomicUsize>,
        create_only: bool,
        /// When set, list and create wait for a notification before touching
        /// the store.
        hold: Option<Arc<Notify>>,
        /// One entry per finished list: whether it ended `Cancelled`.
        list_cancelled: Arc<Mutex<Vec<bool>>>,
        seen_params: Arc<Mutex<Option<PathParams>>>,
    }

    impl Notes {
        fn held(hold: Arc<Notify>) -> Self {
            Self {
                hold: Some(hold),
                ..Self::default()
            }
        }

        async fn wait(&self) {
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
        }
    }

    impl Resource for Notes {
        type Model = Note;

        fn name(&self) -> &str {
            "note"
        }

        fn filter_params(&self, params: &PathParams) -> Vec<FilterParam> {
            params
                .get("book_id")
                .and_then(|b| b.parse::<u64>().ok())
                .map(|b| vec![FilterParam::eq("book_id", json!(b))])
                .unwrap_or_default()
        }

        fn decode(&self, body: &[u8], params: &PathParams) -> Result<Decoded<Note>, ResourceError> {
            let mut note: Note = serde_json::from_slice(body)
                .map_err(|e| ResourceError::Unprocessable(format!("invalid note payload: {e}")))?;
            if let Some(book) = params.get("book_id").and_then(|b| b.parse().ok()) {
                note.book_id = book;
            }
            if self.create_only {
                Ok(Decoded::only(note, Verb::Create))
            } else {
                Ok(Decoded::any(note))
            }
        }
    }

    #[async_trait::async_trait]
    impl List for Notes {
        async fn list(
            &self,
            query: &ListQuery,
            ctx: &RequestContext,
            filters: &[FilterParam],
        ) -> Result<Page<Note>, ResourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.wait().await;
            let found = self.store.find(query, filters, ctx);
            self.list_cancelled
                .lock()
                .push(matches!(found, Err(ResourceError::Cancelled)));
            let (items, total) = found?;
            Ok(Page { items, total })
        }
    }

    #[async_trait::async_trait]
    impl Get for Notes {
        async fn get(&self, id: &str, ctx: &RequestContext) -> Result<Note, ResourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_params.lock() = Some(ctx.params().clone());
            let id = MemoryStore::<Note>::parse_id(id, "note")?;
            self.store.get_by_id(id, "note", ctx)
        }
    }

    #[async_trait::async_trait]
    impl Create for Notes {
        async fn create(&self, note: Note, _ctx: &RequestContext) -> Result<Note, ResourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.wait().await;
            if note.text.is_empty() {
                return Err(ResourceError::Unprocessable("text must not be empty".into()));
            }
            Ok(self.store.create(note))
        }
    }

    #[async_trait::async_trait]
    impl Update for Notes {
        async fn update(&self, id: &str, note: Note, _ctx: &RequestContext) -> Result<Note, ResourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = MemoryStore::<Note>::parse_id(id, "note")?;
            self.store.save(id, note, "note")
        }
    }

    #[async_trait::async_trait]
    impl Delete for Notes {
        async fn delete(&self, id: &str, _ctx: &RequestContext) -> Result<bool, ResourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = MemoryStore::<Note>::parse_id(id, "note")?;
            Ok(self.store.delete(id))
        }
    }

    struct Deny;

    #[async_trait::async_trait]
    impl Stage for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        async fn run(&self, _req: &mut GateRequest<'_>) -> Flow {
            Flow::Abort(AppError::unauthorized("denied").into_response())
        }
    }

    fn app(notes: Notes) -> Router {
        ResourceRoutes::new("/notes", notes, Pipeline::new()).crud().into_router()
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value, Option<String>) {
        let mut builder = Request::builder().method(method).uri(uri).header("X-Trace-Id", "t-1");
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let trace = response
            .headers()
            .get("x-trace-id")
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json, trace)
    }

    #[tokio::test]
    async fn empty_list_is_array_not_null() {
        let app = app(Notes::default());
        let (status, body, trace) = send(&app, Method::GET, "/notes/list?limit=10&offset=0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"data": [], "error": null, "total": 0}));
        assert_eq!(trace.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn list_without_limit_is_400_and_skips_entity() {
        let notes = Notes::default();
        let app = app(notes.clone());
        let (status, body, _) = send(&app, Method::GET, "/notes/list?offset=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "limit is required");
        assert_eq!(notes.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn list_error_is_embedded_with_200() {
        let app = app(Notes::default());
        let (status, body, _) =
            send(&app, Method::GET, "/notes/list?limit=5&sort%5Btext%5D=sideways", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
        assert!(body["error"].is_string());
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let app = app(Notes::default());
        let (status, created, _) =
            send(&app, Method::POST, "/notes", Some(json!({"text": "hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        let id = created["data"]["id"].as_u64().unwrap();

        let (status, fetched, _) = send(&app, Method::GET, &format!("/notes/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"], created["data"]);
        assert_eq!(fetched["error"], Value::Null);
    }

    #[tokio::test]
    async fn get_missing_is_404_envelope() {
        let app = app(Notes::default());
        let (status, body, _) = send(&app, Method::GET, "/notes/41", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"data": null, "error": "note 41 not found"}));
    }

    #[tokio::test]
    async fn malformed_payload_is_422() {
        let notes = Notes::default();
        let app = app(notes.clone());
        let (status, body, _) = send(&app, Method::POST, "/notes", Some(json!({"nope": 1}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().starts_with("invalid note payload"));
        assert_eq!(notes.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verb_failure_is_422() {
        let app = app(Notes::default());
        let (status, body, _) = send(&app, Method::POST, "/notes", Some(json!({"text": ""}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, json!({"error": "text must not be empty"}));
    }

    #[tokio::test]
    async fn create_only_payload_cannot_update() {
        let notes = Notes {
            create_only: true,
            ..Notes::default()
        };
        let app = app(notes.clone());
        let (status, _, _) = send(&app, Method::POST, "/notes", Some(json!({"text": "a"}))).await;
        assert_eq!(status, StatusCode::OK);
        let calls_before = notes.calls.load(Ordering::SeqCst);

        let (status, body, _) = send(&app, Method::PUT, "/notes/1", Some(json!({"text": "b"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "decoded payload does not support update");
        assert_eq!(notes.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn update_overwrites_row() {
        let app = app(Notes::default());
        send(&app, Method::POST, "/notes", Some(json!({"text": "a"}))).await;
        let (status, body, _) = send(&app, Method::PUT, "/notes/1", Some(json!({"text": "b"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["text"], "b");
        assert_eq!(body["data"]["id"], 1);
    }

    #[tokio::test]
    async fn update_missing_is_422() {
        let app = app(Notes::default());
        let (status, body, _) = send(&app, Method::PUT, "/notes/9", Some(json!({"text": "b"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "note 9 not found");
    }

    #[tokio::test]
    async fn delete_twice_is_200_then_404() {
        let app = app(Notes::default());
        send(&app, Method::POST, "/notes", Some(json!({"text": "a"}))).await;

        let (status, body, _) = send(&app, Method::DELETE, "/notes/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "ok"}));

        let (status, body, _) = send(&app, Method::DELETE, "/notes/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "note 1 not found");
    }

    #[tokio::test]
    async fn delete_unparseable_id_is_404() {
        let app = app(Notes::default());
        let (status, _, _) = send(&app, Method::DELETE, "/notes/abc", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn gate_abort_prevents_entity_call() {
        let notes = Notes::default();
        let app = ResourceRoutes::new("/notes", notes.clone(), Pipeline::new().stage(Deny))
            .crud()
            .into_router();

        for (method, uri, body) in [
            (Method::GET, "/notes/list?limit=1", None),
            (Method::GET, "/notes/1", None),
            (Method::POST, "/notes", Some(json!({"text": "a"}))),
            (Method::PUT, "/notes/1", Some(json!({"text": "a"}))),
            (Method::DELETE, "/notes/1", None),
        ] {
            let (status, _, _) = send(&app, method, uri, body).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        assert_eq!(notes.calls.load(Ordering::SeqCst), 0);
        assert!(notes.store.is_empty());
    }

    #[tokio::test]
    async fn stage_applies_only_to_later_endpoints() {
        let notes = Notes::default();
        let app = ResourceRoutes::new("/notes", notes, Pipeline::new())
            .list()
            .get()
            .stage(Deny)
            .create()
            .into_router();

        let (status, _, _) = send(&app, Method::GET, "/notes/list?limit=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send(&app, Method::POST, "/notes", Some(json!({"text": "a"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn child_resource_is_scoped_to_parent() {
        let notes = Notes::default();
        let app = ResourceRoutes::new("/books/:book_id/notes", notes, Pipeline::new())
            .list()
            .create()
            .into_router();

        send(&app, Method::POST, "/books/1/notes", Some(json!({"text": "a"}))).await;
        send(&app, Method::POST, "/books/2/notes", Some(json!({"text": "b"}))).await;
        send(&app, Method::POST, "/books/2/notes", Some(json!({"text": "c"}))).await;

        let (status, body, _) = send(&app, Method::GET, "/books/2/notes/list?limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert!(body["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|n| n["book_id"] == 2));
    }

    #[tokio::test]
    async fn renamed_id_param_reaches_entity() {
        let notes = Notes::default();
        let app = ResourceRoutes::new("/notes", notes, Pipeline::new())
            .id_param("note_id")
            .create()
            .get()
            .into_router();
        send(&app, Method::POST, "/notes", Some(json!({"text": "a"}))).await;
        let (status, body, _) = send(&app, Method::GET, "/notes/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["text"], "a");
    }

    #[tokio::test]
    async fn unregistered_verbs_are_not_routed() {
        let app = ResourceRoutes::new("/notes", Notes::default(), Pipeline::new())
            .list()
            .into_router();
        let (status, _, _) = send(&app, Method::DELETE, "/notes/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn entity_sees_path_params_in_context() {
        let notes = Notes::default();
        let app = ResourceRoutes::new("/books/:book_id/notes", notes.clone(), Pipeline::new())
            .get()
            .into_router();
        send(&app, Method::GET, "/books/4/notes/9", None).await;
        let seen = notes.seen_params.lock().clone().unwrap();
        assert_eq!(seen.get("book_id"), Some("4"));
        assert_eq!(seen.id(), Some("9"));
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn create_completes_after_client_goes_away() {
        let hold = Arc::new(Notify::new());
        let notes = Notes::held(hold.clone());
        let app = app(notes.clone());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/notes")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"text": "kept"}"#))
            .unwrap();
        let abandoned = tokio::time::timeout(Duration::from_millis(50), app.clone().oneshot(request)).await;
        assert!(abandoned.is_err(), "handler should still be waiting on the entity");
        assert!(notes.store.is_empty());

        hold.notify_one();
        wait_until(|| notes.store.len() == 1).await;
        assert_eq!(notes.store.len(), 1);

        let (status, body, _) = send(&app, Method::GET, "/notes/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["text"], "kept");
    }

    #[tokio::test]
    async fn list_abandoned_by_client_ends_cancelled() {
        let hold = Arc::new(Notify::new());
        let notes = Notes::held(hold.clone());
        notes.store.create(Note {
            id: 0,
            book_id: 0,
            text: "a".into(),
        });
        let app = app(notes.clone());

        let request = Request::builder()
            .uri("/notes/list?limit=10")
            .body(Body::empty())
            .unwrap();
        let abandoned = tokio::time::timeout(Duration::from_millis(50), app.clone().oneshot(request)).await;
        assert!(abandoned.is_err());

        hold.notify_one();
        wait_until(|| !notes.list_cancelled.lock().is_empty()).await;
        assert_eq!(*notes.list_cancelled.lock(), vec![true]);
    }
}
