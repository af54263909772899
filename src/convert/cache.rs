//! Per-model cache of rendered views

use super::{project, ConversionError, RenderFormat, RenderedView, ViewType};
use crate::process::CanonicalModel;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

type Key = (Uuid, ViewType, RenderFormat);

/// Model whose views may be stored
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Retained {
    /// No model has been retained yet
    #[default]
    Any,
    Model(Uuid),
    Nothing,
}

impl Retained {
    fn admits(self, id: Uuid) -> bool {
        match self {
            Retained::Any => true,
            Retained::Model(keep) => keep == id,
            Retained::Nothing => false,
        }
    }
}

#[derive(Debug, Default)]
struct Entries {
    retained: Retained,
    views: HashMap<Key, Arc<RenderedView>>,
}

/// Rendered views keyed by model identity, view type and image format.
///
/// Entries for a model stay valid for as long as the model does, because
/// models are immutable. Entries of replaced models are dropped with
/// [`ViewCache::retain_model`], and renders of a replaced model that finish
/// afterwards are returned without being stored.
#[derive(Debug, Default)]
pub struct ViewCache {
    entries: Mutex<Entries>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_or_render(
        &self,
        model: &CanonicalModel,
        view: ViewType,
        format: RenderFormat,
    ) -> Result<Arc<RenderedView>, ConversionError> {
        let key = (model.id, view, format);
        if let Some(hit) = self.lock().views.get(&key) {
            return Ok(Arc::clone(hit));
        }

        // Render without holding the lock; a concurrent render of the same
        // key produces an identical value
        let rendered = Arc::new(project(model, view, format)?);
        let mut entries = self.lock();
        if entries.retained.admits(model.id) {
            entries
                .views
                .entry(key)
                .or_insert_with(|| Arc::clone(&rendered));
        }
        Ok(rendered)
    }

    /// Drop every entry that does not belong to `keep`
    pub fn retain_model(&self, keep: Option<Uuid>) {
        let mut entries = self.lock();
        entries.retained = keep.map_or(Retained::Nothing, Retained::Model);
        entries.views.retain(|(id, _, _), _| Some(*id) == keep);
    }

    #[cfg(test)]
    fn stored_views(&self) -> usize {
        self.lock().views.len()
    }
}
