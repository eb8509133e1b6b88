// Offset-addressed entities and the shared data-set handle they point back to.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
struct DataSetInfo {
    name: String,
    path: Option<PathBuf>,
}

/// Opaque handle to the data set that owns a group of entities.
///
/// Clones share one identity; two handles compare equal only when they came
/// from the same `new` call, regardless of name.
#[derive(Clone)]
pub struct DataSetRef {
    inner: Arc<DataSetInfo>,
}

impl DataSetRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DataSetInfo {
                name: name.into(),
                path: None,
            }),
        }
    }

    pub fn with_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DataSetInfo {
                name: name.into(),
                path: Some(path.into()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }
}

impl PartialEq for DataSetRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DataSetRef {}

impl Hash for DataSetRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for DataSetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataSetRef").field(&self.inner.name).finish()
    }
}

/// A value living at a fixed byte offset inside a data set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OffsetEntity {
    data_set: DataSetRef,
    offset: u64,
}

impl OffsetEntity {
    pub fn new(data_set: DataSetRef, offset: u64) -> Self {
        Self { data_set, offset }
    }

    pub fn data_set(&self) -> &DataSetRef {
        &self.data_set
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}
