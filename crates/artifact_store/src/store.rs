//! Storage contract consumed by the scheduler and the query surface.

use common::{Error, Result};

/// Precondition for a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Write unconditionally.
    None,
    /// Write only if the key does not exist.
    DoesNotExist,
    /// Write only if the stored bytes equal these.
    Matches(Vec<u8>),
}

impl WritePrecondition {
    /// Precondition that holds exactly when the key still has `observed`.
    pub fn from_observed(observed: Option<Vec<u8>>) -> Self {
        match observed {
            Some(bytes) => WritePrecondition::Matches(bytes),
            None => WritePrecondition::DoesNotExist,
        }
    }

    pub fn holds_for(&self, current: Option<&[u8]>) -> bool {
        match self {
            WritePrecondition::None => true,
            WritePrecondition::DoesNotExist => current.is_none(),
            WritePrecondition::Matches(expected) => current == Some(expected.as_slice()),
        }
    }
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    Written,
    /// Nothing was written; carries what the key held instead.
    PreconditionFailed { current: Option<Vec<u8>> },
}

/// Abstract blob store with overwrite semantics and no versioning.
pub trait ArtifactStore: Send + Sync {
    /// Read an entire artifact. Returns `Error::NotFound` if the key is absent.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write (overwrite) an artifact.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove an artifact. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Read an artifact, mapping a missing key to `None`.
    fn get_opt(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get(key) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write only if `precondition` holds for the current contents.
    ///
    /// The default is read-compare-write and is not atomic against other
    /// writers; backends that can do better override it.
    fn put_if(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: &WritePrecondition,
    ) -> Result<WriteResult> {
        let current = self.get_opt(key)?;
        if !precondition.holds_for(current.as_deref()) {
            return Ok(WriteResult::PreconditionFailed { current });
        }
        self.put(key, bytes)?;
        Ok(WriteResult::Written)
    }
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for &S {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).put(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn put_if(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: &WritePrecondition,
    ) -> Result<WriteResult> {
        (**self).put_if(key, bytes, precondition)
    }
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for Box<S> {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).put(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn put_if(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: &WritePrecondition,
    ) -> Result<WriteResult> {
        (**self).put_if(key, bytes, precondition)
    }
}
