//! Applies a projection to stored documents, loading embedded references.

use crate::document::reference_identifier;
use crate::error::AppError;
use crate::projection::build::ProjectionConfig;
use crate::schema::{NestedSchema, PropertyDescriptor, ResourceSchema, SchemaCache, IDENTITY_PATH};
use crate::store::ResourceStore;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct Renderer<'a> {
    store: &'a dyn ResourceStore,
    schemas: &'a SchemaCache,
    alias: &'a str,
}

impl<'a> Renderer<'a> {
    pub fn new(store: &'a dyn ResourceStore, schemas: &'a SchemaCache, alias: &'a str) -> Self {
        Renderer { store, schemas, alias }
    }

    pub async fn render(
        &self,
        doc: &Value,
        schema: &ResourceSchema,
        config: &ProjectionConfig,
    ) -> Result<Value, AppError> {
        match doc {
            Value::Object(map) => Ok(Value::Object(self.render_object(map, schema, config).await?)),
            other => Ok(other.clone()),
        }
    }

    pub async fn render_all(
        &self,
        docs: &[Value],
        schema: &ResourceSchema,
        config: &ProjectionConfig,
    ) -> Result<Vec<Value>, AppError> {
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            out.push(self.render(doc, schema, config).await?);
        }
        Ok(out)
    }

    fn render_object<'b>(
        &'b self,
        doc: &'b Map<String, Value>,
        schema: &'b ResourceSchema,
        config: &'b ProjectionConfig,
    ) -> BoxFuture<'b, Result<Map<String, Value>, AppError>> {
        Box::pin(async move {
            let mut out = Map::new();
            if config.include_all {
                for prop in &schema.properties {
                    if prop.is_technical_identity() || !config.allows(&prop.name) {
                        continue;
                    }
                    let Some(value) = doc.get(&prop.path) else {
                        continue;
                    };
                    let plain = value.is_null()
                        || (prop.nested.is_none() && !value.is_object() && !value.is_array());
                    if plain {
                        out.insert(prop.name.clone(), value.clone());
                        continue;
                    }
                    // Non-scalar values without a descend entry are left out.
                    let Some(child) = config.child(&prop.name) else {
                        continue;
                    };
                    let rendered = self.render_property(prop, value, child).await?;
                    out.insert(prop.name.clone(), rendered);
                }
            }
            if let Some(key) = &config.expose_identifier_as {
                if let Some(id) = doc.get(IDENTITY_PATH) {
                    out.insert(key.clone(), id.clone());
                }
            }
            Ok(out)
        })
    }

    async fn render_property(
        &self,
        prop: &PropertyDescriptor,
        value: &Value,
        config: &ProjectionConfig,
    ) -> Result<Value, AppError> {
        match value {
            Value::Array(items) if prop.multi_valued => {
                let fallback = ProjectionConfig::all();
                let element = config
                    .elements
                    .as_deref()
                    .or(config.descend_all.as_deref())
                    .unwrap_or(&fallback);
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.render_value(prop, item, element).await?);
                }
                Ok(Value::Array(out))
            }
            other => self.render_value(prop, other, config).await,
        }
    }

    async fn render_value(
        &self,
        prop: &PropertyDescriptor,
        value: &Value,
        config: &ProjectionConfig,
    ) -> Result<Value, AppError> {
        match (&prop.nested, value) {
            (Some(NestedSchema::Inline(schema)), Value::Object(map)) => {
                Ok(Value::Object(self.render_object(map, schema, config).await?))
            }
            (Some(NestedSchema::Reference(type_name)), _) => {
                self.render_reference(type_name, value, config).await
            }
            _ => Ok(value.clone()),
        }
    }

    /// Identifier stub, or the referenced aggregate when the projection embeds it.
    async fn render_reference(
        &self,
        type_name: &str,
        value: &Value,
        config: &ProjectionConfig,
    ) -> Result<Value, AppError> {
        let Some(identifier) = reference_identifier(value, self.alias) else {
            return Ok(value.clone());
        };
        let key = config
            .expose_identifier_as
            .clone()
            .unwrap_or_else(|| self.alias.to_string());
        if config.include_all {
            if let Some(Value::Object(doc)) = self.store.find(type_name, &identifier).await? {
                let schema = self.schemas.get(type_name, self.alias)?;
                let mut out = self.render_object(&doc, &schema, config).await?;
                out.entry(key).or_insert(Value::String(identifier));
                return Ok(Value::Object(out));
            }
            tracing::debug!(type_name, identifier = %identifier, "embedded reference not found");
        }
        let mut stub = Map::new();
        stub.insert(key, Value::String(identifier));
        Ok(Value::Object(stub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::build::{apply_embed_overrides, apply_field_overrides, build_default_projection};
    use crate::schema::reflect::tests::fixture_registry;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (MemoryStore, SchemaCache) {
        let store = MemoryStore::new();
        store
            .add(
                "AggregateRoot",
                "other",
                json!({"__identity": "other", "title": "Other", "email": null, "entities": []}),
            )
            .await
            .unwrap();
        (store, SchemaCache::new(Arc::new(fixture_registry())))
    }

    fn doc() -> Value {
        json!({
            "__identity": "root",
            "title": "Root",
            "email": "a@example.com",
            "entities": [{"__identity": "e1", "title": "Child", "entities": ["e2"]}],
            "otherAggregate": "other"
        })
    }

    #[tokio::test]
    async fn references_render_as_stubs_by_default() {
        let (store, schemas) = setup().await;
        let schema = schemas.get("AggregateRoot", "uuid").unwrap();
        let config = build_default_projection(&schema, "uuid");
        let out = Renderer::new(&store, &schemas, "uuid")
            .render(&doc(), &schema, &config)
            .await
            .unwrap();
        assert_eq!(
            out,
            json!({
                "title": "Root",
                "email": "a@example.com",
                "entities": [{"title": "Child", "entities": [{"uuid": "e2"}], "uuid": "e1"}],
                "otherAggregate": {"uuid": "other"},
                "uuid": "root"
            })
        );
    }

    #[tokio::test]
    async fn embedded_references_are_loaded() {
        let (store, schemas) = setup().await;
        let schema = schemas.get("AggregateRoot", "uuid").unwrap();
        let config = apply_embed_overrides(build_default_projection(&schema, "uuid"), "otherAggregate").unwrap();
        let out = Renderer::new(&store, &schemas, "uuid")
            .render(&doc(), &schema, &config)
            .await
            .unwrap();
        assert_eq!(out["otherAggregate"]["title"], "Other");
        assert_eq!(out["otherAggregate"]["uuid"], "other");
    }

    #[tokio::test]
    async fn field_exclusions_drop_properties() {
        let (store, schemas) = setup().await;
        let schema = schemas.get("AggregateRoot", "uuid").unwrap();
        let config = apply_field_overrides(build_default_projection(&schema, "uuid"), "!email,!entities");
        let out = Renderer::new(&store, &schemas, "uuid")
            .render(&doc(), &schema, &config)
            .await
            .unwrap();
        assert!(out.get("email").is_none());
        assert!(out.get("entities").is_none());
        assert_eq!(out["uuid"], "root");
    }
}
