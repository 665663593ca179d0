//! Access to the remote eLabFTW notebook.

mod client;
mod models;

use std::path::Path;

pub use client::ElabClient;
pub use models::{Category, EntityType, Entry, EntryPatch, ItemLink, Team, Upload, User};

use crate::Result;

/// The notebook operations elablog needs.
///
/// [`ElabClient`] implements this against the REST API. Fragment editing is written against
/// the trait so it can run on an in-memory notebook as well.
pub trait Notebook {
    /// Entries of one kind, newest first as the service orders them.
    fn list_entries(&self, entity: EntityType) -> Result<Vec<Entry>>;

    fn get_entry(&self, entity: EntityType, id: i64) -> Result<Entry>;

    /// Create an empty entry and return its id.
    fn create_entry(&self, entity: EntityType, category: Option<i64>) -> Result<i64>;

    /// Apply a partial update. Body updates replace the whole body; last writer wins.
    fn patch_entry(&self, entity: EntityType, id: i64, patch: &EntryPatch) -> Result<()>;

    /// The user the API key belongs to.
    fn me(&self) -> Result<User>;

    fn user(&self, id: i64) -> Result<User>;

    fn experiment_categories(&self, team: i64) -> Result<Vec<Category>>;

    /// Resource categories (items types).
    fn resource_categories(&self) -> Result<Vec<Category>>;

    fn link_item(&self, experiment: i64, item: i64) -> Result<()>;

    fn unlink_item(&self, experiment: i64, item: i64) -> Result<()>;

    /// Attach a file to an entry with an upload comment.
    fn upload_file(&self, entity: EntityType, id: i64, path: &Path, comment: &str) -> Result<()>;

    fn uploads(&self, entity: EntityType, id: i64) -> Result<Vec<Upload>>;

    /// Replace an entry's body.
    fn patch_body(&self, entity: EntityType, id: i64, body: &str) -> Result<()> {
        self.patch_entry(entity, id, &EntryPatch::body(body))
    }
}
