mod layered;
mod param_gen;

pub use layered::{Init, LayerInit, LayeredParamGen};
pub use param_gen::ParamGen;
