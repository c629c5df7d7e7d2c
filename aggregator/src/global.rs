/// The server's copy of the model parameters.
///
/// Every successful aggregation produces a new `GlobalModel` with the next version, the previous
/// one is never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalModel {
    version: u64,
    params: Vec<f32>,
}

impl GlobalModel {
    /// Creates the initial `GlobalModel`, at version `0`.
    pub fn new(params: Vec<f32>) -> Self {
        Self { version: 0, params }
    }

    /// Creates a `GlobalModel` at a given version, used when restoring a saved model.
    pub fn with_version(version: u64, params: Vec<f32>) -> Self {
        Self { version, params }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Returns the amount of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Builds the model that follows this one.
    pub(crate) fn next(&self, params: Vec<f32>) -> Self {
        Self {
            version: self.version + 1,
            params,
        }
    }
}
