//! Index, field and sorter lifecycle.
//!
//! Every mutating admin operation follows the same shape: reject when the
//! index is missing (or, for create, already present), reject with `Busy`
//! while another job runs against the index, create a job, do the work
//! with progress updates, finish the job. The per-record loops snapshot
//! the id set once up front — the pager share-locks the id hash, and
//! holding that lock across the whole operation would deadlock against
//! the writes the loop itself performs.
//!
//! Jobs are not transactional: a per-record failure aborts the remaining
//! work and surfaces the error, but already-processed records keep their
//! new projections.

use crate::db::ScribeDb;
use crate::error::{Result, ScribeDbError};
use scribedb_commons::validation;
use scribedb_commons::{FieldDefinition, IndexName, IndexSchema, JobId, SorterDefinition};
use serde_json::Value;

impl ScribeDb {
    /// Creates an index from a validated schema. Fields must be non-empty;
    /// ids, types and filters are checked against the engine's
    /// capabilities.
    pub async fn create_index(&self, schema: IndexSchema) -> Result<JobId> {
        if self.registry.contains(&schema.id) {
            return Err(ScribeDbError::AlreadyExists(format!(
                "index '{}'",
                schema.id
            )));
        }
        schema.validate(
            self.engine.supported_types(),
            self.engine.supported_filters(),
        )?;

        self.jobs.ensure_idle(&schema.id)?;
        let job = self
            .jobs
            .create(schema.id.clone(), format!("create index '{}'", schema.id));
        let result = self.registry.persist(schema).await.map(|_| ());
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    /// Patches index-level settings. `fields` and `sorters` are forbidden
    /// here — they change through the field/sorter operations below.
    pub async fn update_index(&self, index: &str, patch: &Value) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        let Value::Object(patch_map) = patch else {
            return Err(ScribeDbError::InvalidUpdate(
                "index patch must be an object".to_string(),
            ));
        };
        for key in patch_map.keys() {
            match key.as_str() {
                "remove_words" => {}
                "fields" | "sorters" => {
                    return Err(ScribeDbError::InvalidUpdate(format!(
                        "'{}' changes through the field and sorter operations",
                        key
                    )))
                }
                other => {
                    return Err(ScribeDbError::InvalidUpdate(format!(
                        "unknown index setting '{}'",
                        other
                    )))
                }
            }
        }

        self.jobs.ensure_idle(&name)?;
        let job = self
            .jobs
            .create(name.clone(), format!("update index '{}'", name));
        let result = async {
            let mut updated = (*schema).clone();
            if let Some(words) = patch_map.get("remove_words") {
                updated.remove_words =
                    serde_json::from_value(words.clone()).map_err(|e| {
                        ScribeDbError::InvalidUpdate(format!("remove_words: {}", e))
                    })?;
            }
            self.registry.persist(updated).await.map(|_| ())
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    /// Destroys every view of the index, removes all records and their
    /// projections, then drops the schema.
    pub async fn delete_index(&self, index: &str) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        self.jobs.ensure_idle(&name)?;
        let job = self
            .jobs
            .create(name.clone(), format!("delete index '{}'", name));
        let result = async {
            self.views.destroy_views_for(&name);

            let ids = self.engine.record_ids(&schema).await?;
            let total = ids.len().max(1);
            for (done, id) in ids.iter().enumerate() {
                self.engine.unindex_record(id, &schema).await?;
                self.store
                    .delete(&self.config.record_path(&name, id))
                    .await?;
                self.jobs
                    .update_progress(&job, (done + 1) as f64 / total as f64);
            }

            // Residual engine bookkeeping (empty hashes etc.).
            self.store
                .delete_prefix(&format!("{}/", schema.base_path))
                .await?;
            self.registry.remove(&name).await
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    /// Rebuilds index projections: one pass scrubbing the named fields
    /// (all fields when `field_ids` is `None`), one pass rebuilding.
    pub async fn reindex(&self, index: &str, field_ids: Option<&[&str]>) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        if let Some(field_ids) = field_ids {
            for field_id in field_ids {
                if schema.field(field_id).is_none() {
                    return Err(ScribeDbError::NotFound(format!(
                        "field '{}' not found in index '{}'",
                        field_id, name
                    )));
                }
            }
        }

        self.jobs.ensure_idle(&name)?;
        let job = self
            .jobs
            .create(name.clone(), format!("reindex '{}'", name));
        let result = async {
            let mut scrub = (*schema).clone();
            for field in scrub.fields.iter_mut() {
                let covered = field_ids
                    .map(|ids| ids.contains(&field.id.as_str()))
                    .unwrap_or(true);
                if covered {
                    field.delete = true;
                }
            }
            self.run_index_passes(&job, &[&scrub, schema.as_ref()]).await?;
            self.registry.persist((*schema).clone()).await.map(|_| ())
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    // ---- fields ----

    /// Adds a field: persist the schema first, then index every record
    /// once under it.
    pub async fn add_field(&self, index: &str, field: FieldDefinition) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        validation::validate_field_id(&field.id)?;
        if schema.field(&field.id).is_some() {
            return Err(ScribeDbError::AlreadyExists(format!(
                "field '{}' in index '{}'",
                field.id, name
            )));
        }
        let mut updated = (*schema).clone();
        updated.fields.push(field);
        updated.validate(
            self.engine.supported_types(),
            self.engine.supported_filters(),
        )?;

        self.jobs.ensure_idle(&name)?;
        let job = self.jobs.create(
            name.clone(),
            format!("add field to '{}'", name),
        );
        let result = async {
            let persisted = self.registry.persist(updated).await?;
            self.run_index_passes(&job, &[persisted.as_ref()]).await
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    /// Replaces a field definition. Runs the record loop twice: first with
    /// the old definition flagged for deletion (scrubbing its entries,
    /// progress 0 → 0.5), then with the new definition (0.5 → 1.0).
    pub async fn update_field(&self, index: &str, field: FieldDefinition) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        if schema.field(&field.id).is_none() {
            return Err(ScribeDbError::NotFound(format!(
                "field '{}' not found in index '{}'",
                field.id, name
            )));
        }
        let mut updated = (*schema).clone();
        if let Some(slot) = updated.field_mut(&field.id) {
            *slot = field.clone();
        }
        updated.validate(
            self.engine.supported_types(),
            self.engine.supported_filters(),
        )?;

        self.jobs.ensure_idle(&name)?;
        let job = self.jobs.create(
            name.clone(),
            format!("update field '{}' in '{}'", field.id, name),
        );
        let result = async {
            let mut scrub = (*schema).clone();
            if let Some(slot) = scrub.field_mut(&field.id) {
                slot.delete = true;
            }
            self.run_index_passes(&job, &[&scrub, &updated]).await?;
            self.registry.persist(updated).await.map(|_| ())
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    /// Removes a field: scrub its index entries, then drop the definition.
    pub async fn delete_field(&self, index: &str, field_id: &str) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        if schema.field(field_id).is_none() {
            return Err(ScribeDbError::NotFound(format!(
                "field '{}' not found in index '{}'",
                field_id, name
            )));
        }
        if schema.fields.len() == 1 {
            return Err(ScribeDbError::InvalidSchema(format!(
                "cannot delete the last field of index '{}'",
                name
            )));
        }

        self.jobs.ensure_idle(&name)?;
        let job = self.jobs.create(
            name.clone(),
            format!("delete field '{}' from '{}'", field_id, name),
        );
        let result = async {
            let mut scrub = (*schema).clone();
            if let Some(slot) = scrub.field_mut(field_id) {
                slot.delete = true;
            }
            self.run_index_passes(&job, &[&scrub]).await?;

            let mut updated = (*schema).clone();
            updated.fields.retain(|f| f.id != field_id);
            self.registry.persist(updated).await.map(|_| ())
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    // ---- sorters ----

    /// Adds a sorter: persist first, then one indexing pass to compute its
    /// values.
    pub async fn add_sorter(&self, index: &str, sorter: SorterDefinition) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        validation::validate_sorter_id(&sorter.id)?;
        if schema.sorter(&sorter.id).is_some() {
            return Err(ScribeDbError::AlreadyExists(format!(
                "sorter '{}' in index '{}'",
                sorter.id, name
            )));
        }
        let mut updated = (*schema).clone();
        updated.sorters.push(sorter);

        self.jobs.ensure_idle(&name)?;
        let job = self.jobs.create(
            name.clone(),
            format!("add sorter to '{}'", name),
        );
        let result = async {
            let persisted = self.registry.persist(updated).await?;
            self.run_index_passes(&job, &[persisted.as_ref()]).await
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    /// Replaces a sorter definition; scrub pass then rebuild pass, like
    /// `update_field`.
    pub async fn update_sorter(&self, index: &str, sorter: SorterDefinition) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        if schema.sorter(&sorter.id).is_none() {
            return Err(ScribeDbError::NotFound(format!(
                "sorter '{}' not found in index '{}'",
                sorter.id, name
            )));
        }
        let mut updated = (*schema).clone();
        if let Some(slot) = updated.sorter_mut(&sorter.id) {
            *slot = sorter.clone();
        }

        self.jobs.ensure_idle(&name)?;
        let job = self.jobs.create(
            name.clone(),
            format!("update sorter '{}' in '{}'", sorter.id, name),
        );
        let result = async {
            let mut scrub = (*schema).clone();
            if let Some(slot) = scrub.sorter_mut(&sorter.id) {
                slot.delete = true;
            }
            self.run_index_passes(&job, &[&scrub, &updated]).await?;
            self.registry.persist(updated).await.map(|_| ())
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    /// Removes a sorter: scrub its values, then drop the definition.
    pub async fn delete_sorter(&self, index: &str, sorter_id: &str) -> Result<JobId> {
        let name = IndexName::new(index);
        let schema = self.registry.require(&name)?;

        if schema.sorter(sorter_id).is_none() {
            return Err(ScribeDbError::NotFound(format!(
                "sorter '{}' not found in index '{}'",
                sorter_id, name
            )));
        }

        self.jobs.ensure_idle(&name)?;
        let job = self.jobs.create(
            name.clone(),
            format!("delete sorter '{}' from '{}'", sorter_id, name),
        );
        let result = async {
            let mut scrub = (*schema).clone();
            if let Some(slot) = scrub.sorter_mut(sorter_id) {
                slot.delete = true;
            }
            self.run_index_passes(&job, &[&scrub]).await?;

            let mut updated = (*schema).clone();
            updated.sorters.retain(|s| s.id != sorter_id);
            self.registry.persist(updated).await.map(|_| ())
        }
        .await;
        self.jobs.finish(&job);
        result.map(|()| job)
    }

    /// Runs each schema pass over a one-time snapshot of the id set,
    /// advancing job progress record by record. Aborts at the first
    /// per-record error.
    async fn run_index_passes(&self, job: &JobId, passes: &[&IndexSchema]) -> Result<()> {
        let Some(first) = passes.first() else {
            return Ok(());
        };
        let ids = self.engine.record_ids(first).await?;
        let total_steps = (ids.len() * passes.len()).max(1);
        let mut step = 0usize;

        for pass in passes {
            for id in &ids {
                let key = self.config.record_path(&pass.id, id);
                let body = self.store.get(&key).await?.ok_or_else(|| {
                    ScribeDbError::NotFound(format!(
                        "record '{}' in index '{}'",
                        id, pass.id
                    ))
                })?;
                self.engine.index_record(id, &body, pass).await?;
                step += 1;
                self.jobs
                    .update_progress(job, step as f64 / total_steps as f64);
            }
        }
        Ok(())
    }
}
