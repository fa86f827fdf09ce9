//! Demo resources: `widgets` and the parent-scoped `widgets/:widget_id/parts`.

use std::time::Duration;

use gatekit_api::HealthProbe;
use gatekit_core::{
    Create, Decoded, Delete, FilterParam, Get, List, ListQuery, MemoryStore, Page, PathParams,
    Record, RequestContext, Resource, ResourceError, Update,
};
use serde::{Deserialize, Serialize};

/// Path parameter naming the parent widget.
pub const WIDGET_ID_PARAM: &str = "widget_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub weight: i64,
}

impl Record for Widget {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub id: u64,
    /// Always taken from the path, never from the body.
    #[serde(default)]
    pub widget_id: u64,
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

impl Record for Part {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

fn require_name(name: &str, entity: &str) -> Result<(), ResourceError> {
    if name.trim().is_empty() {
        return Err(ResourceError::Unprocessable(format!("{entity} name is required")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct Widgets {
    store: MemoryStore<Widget>,
}

impl Widgets {
    pub fn store(&self) -> &MemoryStore<Widget> {
        &self.store
    }
}

impl Resource for Widgets {
    type Model = Widget;

    fn name(&self) -> &str {
        "widget"
    }
}

#[async_trait::async_trait]
impl List for Widgets {
    async fn list(
        &self,
        query: &ListQuery,
        ctx: &RequestContext,
        filters: &[FilterParam],
    ) -> Result<Page<Widget>, ResourceError> {
        let (items, total) = self.store.find(query, filters, ctx)?;
        Ok(Page { items, total })
    }
}

#[async_trait::async_trait]
impl Get for Widgets {
    async fn get(&self, id: &str, ctx: &RequestContext) -> Result<Widget, ResourceError> {
        let id = MemoryStore::<Widget>::parse_id(id, "widget")?;
        self.store.get_by_id(id, "widget", ctx)
    }
}

#[async_trait::async_trait]
impl Create for Widgets {
    async fn create(&self, widget: Widget, ctx: &RequestContext) -> Result<Widget, ResourceError> {
        require_name(&widget.name, "widget")?;
        let widget = self.store.create(widget);
        tracing::info!(trace_id = %ctx.trace_id(), id = widget.id, "widget created");
        Ok(widget)
    }
}

#[async_trait::async_trait]
impl Update for Widgets {
    async fn update(&self, id: &str, widget: Widget, _ctx: &RequestContext) -> Result<Widget, ResourceError> {
        require_name(&widget.name, "widget")?;
        let id = MemoryStore::<Widget>::parse_id(id, "widget")?;
        self.store.save(id, widget, "widget")
    }
}

#[async_trait::async_trait]
impl Delete for Widgets {
    async fn delete(&self, id: &str, ctx: &RequestContext) -> Result<bool, ResourceError> {
        let id = MemoryStore::<Widget>::parse_id(id, "widget")?;
        let removed = self.store.delete(id);
        tracing::info!(trace_id = %ctx.trace_id(), id, removed, "widget delete");
        Ok(removed)
    }
}

/// Parts of one widget. Lists are scoped to the widget in the path and
/// decoded payloads get its id stamped in.
#[derive(Debug, Clone)]
pub struct Parts {
    store: MemoryStore<Part>,
    widgets: MemoryStore<Widget>,
}

impl Parts {
    pub fn new(widgets: MemoryStore<Widget>) -> Self {
        Self {
            store: MemoryStore::new(),
            widgets,
        }
    }

    pub fn store(&self) -> &MemoryStore<Part> {
        &self.store
    }

    fn parent_exists(&self, widget_id: u64, ctx: &RequestContext) -> Result<(), ResourceError> {
        self.widgets
            .get_by_id(widget_id, "widget", ctx)
            .map(|_| ())
            .map_err(|e| match e {
                ResourceError::NotFound(what) => {
                    ResourceError::Unprocessable(format!("{what} does not exist"))
                }
                other => other,
            })
    }

    /// Fetch a part, treating one that belongs to a different widget than
    /// the path names as missing.
    fn owned(&self, id: u64, ctx: &RequestContext) -> Result<Part, ResourceError> {
        let part = self.store.get_by_id(id, "part", ctx)?;
        match parent_id(ctx.params()) {
            Some(widget_id) if widget_id == part.widget_id => Ok(part),
            _ => Err(ResourceError::NotFound(format!("part {id}"))),
        }
    }
}

fn parent_id(params: &PathParams) -> Option<u64> {
    params.get(WIDGET_ID_PARAM).and_then(|raw| raw.parse().ok())
}

impl Resource for Parts {
    type Model = Part;

    fn name(&self) -> &str {
        "part"
    }

    fn filter_params(&self, params: &PathParams) -> Vec<FilterParam> {
        // an unparseable parent matches nothing
        let widget_id = parent_id(params).map(|id| id as i64).unwrap_or(-1);
        vec![FilterParam::eq(WIDGET_ID_PARAM, widget_id)]
    }

    fn decode(&self, body: &[u8], params: &PathParams) -> Result<Decoded<Part>, ResourceError> {
        let mut part: Part = serde_json::from_slice(body)
            .map_err(|e| ResourceError::Unprocessable(format!("invalid part payload: {e}")))?;
        part.widget_id = parent_id(params).ok_or_else(|| {
            ResourceError::Unprocessable(format!(
                "invalid widget id {:?}",
                params.get(WIDGET_ID_PARAM).unwrap_or_default()
            ))
        })?;
        Ok(Decoded::any(part))
    }
}

#[async_trait::async_trait]
impl List for Parts {
    async fn list(
        &self,
        query: &ListQuery,
        ctx: &RequestContext,
        filters: &[FilterParam],
    ) -> Result<Page<Part>, ResourceError> {
        let (items, total) = self.store.find(query, filters, ctx)?;
        Ok(Page { items, total })
    }
}

#[async_trait::async_trait]
impl Get for Parts {
    async fn get(&self, id: &str, ctx: &RequestContext) -> Result<Part, ResourceError> {
        let id = MemoryStore::<Part>::parse_id(id, "part")?;
        self.owned(id, ctx)
    }
}

#[async_trait::async_trait]
impl Create for Parts {
    async fn create(&self, part: Part, ctx: &RequestContext) -> Result<Part, ResourceError> {
        require_name(&part.name, "part")?;
        self.parent_exists(part.widget_id, ctx)?;
        Ok(self.store.create(part))
    }
}

#[async_trait::async_trait]
impl Update for Parts {
    async fn update(&self, id: &str, part: Part, ctx: &RequestContext) -> Result<Part, ResourceError> {
        require_name(&part.name, "part")?;
        let id = MemoryStore::<Part>::parse_id(id, "part")?;
        let current = self.owned(id, ctx)?;
        if current.widget_id != part.widget_id {
            return Err(ResourceError::NotFound(format!("part {id}")));
        }
        self.store.save(id, part, "part")
    }
}

#[async_trait::async_trait]
impl Delete for Parts {
    async fn delete(&self, id: &str, ctx: &RequestContext) -> Result<bool, ResourceError> {
        let id = MemoryStore::<Part>::parse_id(id, "part")?;
        match self.owned(id, ctx) {
            Ok(_) => Ok(self.store.delete(id)),
            Err(ResourceError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// `/healthz` probe: the store's lock must be acquirable.
pub struct StoreProbe<T: Record> {
    name: &'static str,
    store: MemoryStore<T>,
}

impl<T: Record> StoreProbe<T> {
    pub fn new(name: &'static str, store: MemoryStore<T>) -> Self {
        Self { name, store }
    }
}

#[async_trait::async_trait]
impl<T: Record> HealthProbe for StoreProbe<T> {
    fn name(&self) -> &str {
        self.name
    }

    async fn check(&self) -> Result<(), String> {
        self.store
            .ping(Duration::from_millis(250))
            .map_err(|e| e.to_string())
    }
}
