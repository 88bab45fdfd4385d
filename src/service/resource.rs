//! ResourceService: the actions of one resource over a `ResourceStore`.

use crate::config::{ArgumentNames, ResolvedResource};
use crate::document::{identifier_of, scalar_text};
use crate::error::{AppError, FieldError};
use crate::projection::{apply_embed_overrides, apply_field_overrides, ProjectionConfig, Renderer};
use crate::query::{
    adjacent_pages, build_filter_predicate, build_search_predicate, canonical_path, cursor_query, filter_set,
    parse_sort, search_fields, AdjacentPages, CursorPageRequest, Direction, Predicate, Query, SearchTerms,
};
use crate::query::cursor::cursor_path;
use crate::schema::{describe, ResourceSchema, SchemaCache, IDENTITY_PATH};
use crate::service::mapping::{DocumentMapper, MapMode, PendingReference};
use crate::service::validation::codes;
use crate::store::ResourceStore;
use serde::Serialize;
use serde_json::{Map, Value};

/// Parsed query-string and body arguments. Values are strings, arrays
/// (`x[]=`, repeated keys) or objects (`x[k]=`).
pub type Args = Map<String, Value>;

/// One page of a cursor listing.
#[derive(Debug)]
pub struct ListPage {
    pub items: Vec<Value>,
    pub request: CursorPageRequest,
    pub adjacent: AdjacentPages,
}

#[derive(Debug)]
pub struct Created {
    pub identifiers: Vec<String>,
    /// Rendered resource, or an array of them for batch creates.
    pub body: Value,
    pub batch: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub terms: SearchTerms,
    pub fields: Vec<String>,
    pub results: Vec<Value>,
}

pub struct ResourceService<'a> {
    store: &'a dyn ResourceStore,
    schemas: &'a SchemaCache,
    resource: &'a ResolvedResource,
}

impl<'a> ResourceService<'a> {
    pub fn new(store: &'a dyn ResourceStore, schemas: &'a SchemaCache, resource: &'a ResolvedResource) -> Self {
        ResourceService {
            store,
            schemas,
            resource,
        }
    }

    fn schema(&self) -> &ResourceSchema {
        &self.resource.schema
    }

    fn names(&self) -> &ArgumentNames {
        &self.resource.config.arguments
    }

    fn renderer(&self) -> Renderer<'_> {
        Renderer::new(self.store, self.schemas, self.resource.alias())
    }

    /// Default projection with `fields` and `embed` applied.
    pub fn projection(&self, args: &Args) -> Result<ProjectionConfig, AppError> {
        let mut config = self.resource.default_projection.clone();
        if let Some(fields) = arg_str(args, &self.names().fields) {
            config = apply_field_overrides(config, &fields);
        }
        if let Some(embed) = arg_str(args, &self.names().embed) {
            config = apply_embed_overrides(config, &embed)?;
        }
        Ok(config)
    }

    fn filter_predicate(&self, args: &Args) -> Result<Option<Predicate>, AppError> {
        let filters = filter_set(
            &self.resource.config.default_filter,
            args,
            self.schema(),
            self.names(),
            self.resource.alias(),
        );
        build_filter_predicate(&filters, self.schema())
    }

    pub async fn list(&self, args: &Args) -> Result<ListPage, AppError> {
        let names = self.names();
        let identity = self.resource.identity();
        let requested_cursor = arg_str(args, &names.cursor);
        let cursor_property = requested_cursor
            .as_deref()
            .or(self.resource.config.cursor_property.as_deref())
            .map(|c| canonical_path(c, self.resource.alias()))
            .unwrap_or_else(|| IDENTITY_PATH.to_string());
        if !self.schema().is_persistent_path(&cursor_property, false) {
            return Err(AppError::BadRequest(format!(
                "cannot paginate by '{}'",
                requested_cursor.as_deref().unwrap_or(&cursor_property)
            )));
        }
        let direction = match arg_str(args, &names.dir) {
            Some(dir) => Direction::parse(&dir)
                .ok_or_else(|| AppError::BadRequest(format!("invalid direction '{}'", dir)))?,
            None => Direction::Asc,
        };
        let cursor = cursor_path(&cursor_property, identity);
        let request = CursorPageRequest {
            last_cursor_value: args.get(&names.last).map(|v| self.schema().coerce(&cursor, v.clone())),
            last_identity: args.get(&names.last_id).map(|v| self.coerce_identity(v)),
            limit: arg_u64(args, &names.limit)?,
            cursor_property,
            direction,
        };
        let query = cursor_query(&request, identity, self.filter_predicate(args)?)?;
        let mut rows = self.store.query(self.resource.entity_type(), &query).await?;
        let adjacent = adjacent_pages(&request, requested_cursor.as_deref(), &rows, identity);
        if request.reverses_results() {
            rows.reverse();
        }
        let items = self
            .renderer()
            .render_all(&rows, self.schema(), &self.projection(args)?)
            .await?;
        Ok(ListPage {
            items,
            request,
            adjacent,
        })
    }

    /// `lastId` values are strings from the query; give each component its property type.
    fn coerce_identity(&self, value: &Value) -> Value {
        let identity = self.resource.identity();
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.schema().coerce(k, v.clone())))
                    .collect(),
            ),
            Value::Array(items) if identity.len() > 1 => Value::Array(
                identity
                    .iter()
                    .zip(items)
                    .map(|(c, v)| self.schema().coerce(c, v.clone()))
                    .collect(),
            ),
            other => match identity.first() {
                Some(c) => self.schema().coerce(c, other.clone()),
                None => other.clone(),
            },
        }
    }

    pub async fn show(&self, identifier: &str, args: &Args) -> Result<Value, AppError> {
        let doc = self.load(identifier).await?;
        self.renderer()
            .render(&doc, self.schema(), &self.projection(args)?)
            .await
    }

    async fn load(&self, identifier: &str) -> Result<Value, AppError> {
        self.store
            .find(self.resource.entity_type(), identifier)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} '{}'", self.resource.segment(), identifier)))
    }

    /// `resources` (an array, all or nothing) wins over `resource`.
    pub async fn create(&self, path_identifier: Option<&str>, body: Option<&Value>, args: &Args) -> Result<Created, AppError> {
        let names = self.names();
        let body = body
            .and_then(Value::as_object)
            .ok_or_else(|| AppError::BadRequest("No resource specified".into()))?;
        let (inputs, batch) = match (body.get(&names.resources), body.get(&names.resource)) {
            (Some(Value::Array(items)), _) if path_identifier.is_none() => (items.iter().collect::<Vec<_>>(), true),
            (Some(Value::Array(_)), _) => {
                return Err(AppError::BadRequest("an identifier cannot be given for a batch".into()))
            }
            (Some(_), _) => return Err(AppError::BadRequest(format!("'{}' must be an array", names.resources))),
            (None, Some(one)) => (vec![one], false),
            (None, None) => return Err(AppError::BadRequest("No resource specified".into())),
        };

        let mut documents = Vec::with_capacity(inputs.len());
        let mut references = Vec::new();
        for input in inputs {
            let (identifier, doc, refs) = self.prepare(input, path_identifier)?;
            documents.push((identifier, doc));
            references.extend(refs);
        }
        self.check_references(&references).await?;

        let identifiers: Vec<String> = documents.iter().map(|(id, _)| id.clone()).collect();
        let stored: Vec<Value> = documents.iter().map(|(_, doc)| doc.clone()).collect();
        let entity_type = self.resource.entity_type();
        match documents.len() {
            1 if !batch => {
                let (identifier, doc) = documents.remove(0);
                self.store.add(entity_type, &identifier, doc).await?;
            }
            _ => self.store.add_all(entity_type, documents).await?,
        }
        tracing::debug!(entity_type, count = identifiers.len(), "created");

        let projection = self.projection(args)?;
        let mut rendered = self.renderer().render_all(&stored, self.schema(), &projection).await?;
        let body = if batch {
            Value::Array(rendered)
        } else {
            rendered.pop().unwrap_or(Value::Null)
        };
        Ok(Created {
            identifiers,
            body,
            batch,
        })
    }

    fn prepare(
        &self,
        input: &Value,
        path_identifier: Option<&str>,
    ) -> Result<(String, Value, Vec<PendingReference>), AppError> {
        let mapped = DocumentMapper::new(self.resource.alias()).map_root(input, self.schema(), MapMode::Create)?;
        let mut doc = Value::Object(mapped.document);
        let identity = self.resource.identity();
        let identifier = if identity.iter().any(|p| p == IDENTITY_PATH) {
            path_identifier
                .map(str::to_string)
                .or(mapped.supplied_identifier)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
        } else {
            let identifier = identifier_of(&doc, identity)
                .ok_or_else(|| AppError::BadRequest("resource identity incomplete".into()))?;
            if path_identifier.map_or(false, |p| p != identifier) {
                return Err(AppError::BadRequest(format!(
                    "path identifier does not match resource identity '{}'",
                    identifier
                )));
            }
            identifier
        };
        if let Value::Object(map) = &mut doc {
            map.insert(IDENTITY_PATH.to_string(), Value::String(identifier.clone()));
        }
        Ok((identifier, doc, mapped.references))
    }

    /// References to aggregate roots must name stored documents.
    async fn check_references(&self, references: &[PendingReference]) -> Result<(), AppError> {
        let mut errors = Vec::new();
        for r in references {
            let is_root = self
                .schemas
                .catalog()
                .lookup(&r.entity_type)
                .map_or(false, |t| t.aggregate_root);
            if !is_root {
                continue;
            }
            if self.store.find(&r.entity_type, &r.identifier).await?.is_none() {
                errors.push(FieldError::new(
                    codes::UNRESOLVED_REFERENCE,
                    &r.field,
                    format!("{} '{}' does not exist", r.entity_type, r.identifier),
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    /// Merge the given properties into the stored document. Identity is immutable.
    pub async fn update(&self, identifier: &str, body: Option<&Value>) -> Result<(), AppError> {
        let input = body
            .and_then(|b| b.get(&self.names().resource))
            .ok_or_else(|| AppError::BadRequest("No resource specified".into()))?;
        let stored = self.load(identifier).await?;
        let mapped = DocumentMapper::new(self.resource.alias()).map_root(input, self.schema(), MapMode::Update)?;
        if mapped.supplied_identifier.as_deref().map_or(false, |s| s != identifier) {
            return Err(AppError::BadRequest("resource identity cannot be changed".into()));
        }
        for component in self.resource.identity() {
            if let Some(v) = mapped.document.get(component) {
                if stored.get(component) != Some(v) {
                    return Err(AppError::BadRequest(format!(
                        "identity property '{}' cannot be changed",
                        component
                    )));
                }
            }
        }
        self.check_references(&mapped.references).await?;

        let mut merged = match stored {
            Value::Object(map) => map,
            _ => return Err(AppError::Internal(format!("stored document '{}' is not an object", identifier))),
        };
        merged.extend(mapped.document);
        if !self
            .store
            .update(self.resource.entity_type(), identifier, Value::Object(merged))
            .await?
        {
            return Err(AppError::NotFound(format!("{} '{}'", self.resource.segment(), identifier)));
        }
        Ok(())
    }

    pub async fn remove(&self, identifier: &str) -> Result<(), AppError> {
        if !self.store.remove(self.resource.entity_type(), identifier).await? {
            return Err(AppError::NotFound(format!("{} '{}'", self.resource.segment(), identifier)));
        }
        Ok(())
    }

    fn offset_query(&self, predicate: Option<Predicate>, args: &Args) -> Result<Query, AppError> {
        let names = self.names();
        Ok(Query {
            predicate,
            orderings: arg_str(args, &names.sort)
                .map(|s| parse_sort(&s, self.schema(), self.resource.alias()))
                .unwrap_or_default(),
            limit: arg_u64(args, &names.limit)?.filter(|l| *l > 0),
            offset: arg_u64(args, &names.offset)?,
        })
    }

    pub async fn filter(&self, args: &Args) -> Result<Vec<Value>, AppError> {
        let query = self.offset_query(self.filter_predicate(args)?, args)?;
        let rows = self.store.query(self.resource.entity_type(), &query).await?;
        self.renderer()
            .render_all(&rows, self.schema(), &self.projection(args)?)
            .await
    }

    /// Term search, restricted by the default filter only.
    pub async fn search(&self, args: &Args) -> Result<SearchResult, AppError> {
        let names = self.names();
        let raw = arg_str(args, &names.query)
            .ok_or_else(|| AppError::BadRequest(format!("No search query specified ('{}')", names.query)))?;
        let terms = SearchTerms::parse(&raw);
        let fields = search_fields(
            self.schema(),
            arg_str(args, &names.search).as_deref(),
            self.resource.alias(),
        );
        let defaults = self.filter_predicate(&Args::new())?;
        let query = self
            .offset_query(defaults, args)?
            .and_where(build_search_predicate(&terms, &fields));
        let rows = self.store.query(self.resource.entity_type(), &query).await?;
        let results = self
            .renderer()
            .render_all(&rows, self.schema(), &self.projection(args)?)
            .await?;
        Ok(SearchResult {
            terms,
            fields,
            results,
        })
    }

    pub fn describe(&self, normalize_types: bool) -> Value {
        describe(self.schema(), normalize_types)
    }
}

/// String form of an argument; arrays are joined with commas.
pub fn arg_str(args: &Args, name: &str) -> Option<String> {
    match args.get(name)? {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            (!parts.is_empty()).then(|| parts.join(","))
        }
        other => scalar_text(other).filter(|s| !s.is_empty()),
    }
}

fn arg_u64(args: &Args, name: &str) -> Result<Option<u64>, AppError> {
    arg_str(args, name)
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| AppError::BadRequest(format!("'{}' must be a non-negative integer", name)))
        })
        .transpose()
}
