//! Turning [`StageSpec`]s into linked GStreamer elements

use super::probe::missing_factories;
use super::topology::{CapsField, CapsSpec, StageProperty, StageSpec};
use super::PipelineError;
use gstreamer as gst;
use gstreamer::prelude::*;
use log::debug;

/// Build caps from a capability description
pub fn build_caps(spec: &CapsSpec) -> gst::Caps {
    let mut builder = gst::Caps::builder(spec.media_type);
    for (name, value) in &spec.fields {
        builder = match value {
            CapsField::Str(v) => builder.field(*name, v.as_str()),
            CapsField::Int(v) => builder.field(*name, *v),
            CapsField::Fraction(n, d) => builder.field(*name, gst::Fraction::new(*n, *d)),
        };
    }
    builder.build()
}

/// Instantiate one stage and apply its properties
pub fn build_element(spec: &StageSpec) -> Result<gst::Element, PipelineError> {
    let element = gst::ElementFactory::make(spec.factory)
        .name(spec.name.as_str())
        .build()
        .map_err(|e| {
            PipelineError::ElementFailed(format!("Failed to create {}: {}", spec.factory, e))
        })?;

    for (key, value) in &spec.properties {
        if !element.has_property(key, None) {
            return Err(PipelineError::PropertyFailed(format!(
                "{} has no property '{}'",
                spec.factory, key
            )));
        }
        match value {
            StageProperty::Str(v) => element.set_property(key, v.as_str()),
            StageProperty::Nick(v) => element.set_property_from_str(key, v),
            StageProperty::Int(v) => element.set_property(key, *v),
            StageProperty::UInt(v) => element.set_property(key, *v),
            StageProperty::Bool(v) => element.set_property(key, *v),
            StageProperty::Caps(c) => element.set_property(key, &build_caps(c)),
        }
    }

    debug!("Created stage {}", spec);
    Ok(element)
}

/// Build every stage, add them to a new pipeline and link them in order
pub fn assemble(name: &str, specs: &[StageSpec]) -> Result<gst::Pipeline, PipelineError> {
    let missing = missing_factories(specs);
    if !missing.is_empty() {
        return Err(PipelineError::ElementMissing(
            missing.into_iter().map(String::from).collect(),
        ));
    }

    let elements = specs
        .iter()
        .map(build_element)
        .collect::<Result<Vec<_>, _>>()?;

    let pipeline = gst::Pipeline::with_name(name);
    pipeline
        .add_many(elements.iter())
        .map_err(|e| PipelineError::ElementFailed(format!("Failed to add elements: {}", e)))?;

    for pair in elements.windows(2) {
        pair[0].link(&pair[1]).map_err(|e| {
            PipelineError::LinkFailed(format!("{}->{}: {}", pair[0].name(), pair[1].name(), e))
        })?;
    }

    Ok(pipeline)
}
