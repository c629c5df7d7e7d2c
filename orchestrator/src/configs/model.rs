use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnConfig {
    Sigmoid { amp: f32 },
}

/// How the parameters of a layer are initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGenConfig {
    Const {
        value: f32,
    },
    Uniform {
        low: f32,
        high: f32,
    },
    Normal {
        mean: f32,
        std_dev: f32,
    },
    #[default]
    XavierUniform,
    Kaiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerConfig {
    Dense {
        dim: (usize, usize),
        #[serde(default)]
        init: ParamGenConfig,
        #[serde(default)]
        act_fn: Option<ActFnConfig>,
    },
}

impl LayerConfig {
    /// Returns the `(fan_in, size, fan_out)` of the layer.
    pub fn sizes(&self) -> (usize, usize, usize) {
        match *self {
            LayerConfig::Dense { dim: (n, m), .. } => (n, (n + 1) * m, m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelConfig {
    Sequential { layers: Vec<LayerConfig> },
}
