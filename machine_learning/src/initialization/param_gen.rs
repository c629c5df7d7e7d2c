/// A `ParamGen` generates values for the initial state of the model's parameters.
pub trait ParamGen {
    /// Should sample at most `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The upper limit of samples to generate.
    ///
    /// # Returns
    /// An option whether the generator is exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;

    /// Drains the generator.
    ///
    /// # Returns
    /// Every value the generator still had to give.
    fn sample_all(&mut self) -> Vec<f32> {
        let mut params = Vec::new();

        while let Some(sample) = self.sample(usize::MAX) {
            if sample.is_empty() {
                break;
            }

            params.extend(sample);
        }

        params
    }
}
