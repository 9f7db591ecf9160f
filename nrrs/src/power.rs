use tracing::{debug, warn};

use crate::terrain::EnrichedSample;
use crate::NrrsError;

// Plausible athlete range; values outside it are accepted with a warning.
const PLAUSIBLE_MASS_KG: (f64, f64) = (30.0, 200.0);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normalized {
    /// Samples whose power coerced to a number, in sequence order.
    pub samples: Vec<EnrichedSample>,
    /// Indices into `samples` with strictly positive power.
    pub active: Vec<usize>,
    /// Samples dropped because their power was not numeric.
    pub dropped: usize,
}

impl Normalized {
    pub fn active_samples(&self) -> impl Iterator<Item = &EnrichedSample> + '_ {
        self.active.iter().map(move |&i| &self.samples[i])
    }
}

pub fn validate_body_mass(body_mass_kg: f64) -> Result<(), NrrsError> {
    if !body_mass_kg.is_finite() || body_mass_kg <= 0.0 {
        return Err(NrrsError::InvalidConfiguration(format!(
            "body mass must be a positive number of kilograms, got {body_mass_kg}"
        )));
    }
    Ok(())
}

/// Attach W/kg to every sample with numeric power and mark the active ones.
pub fn normalize(samples: &[EnrichedSample], body_mass_kg: f64) -> Result<Normalized, NrrsError> {
    validate_body_mass(body_mass_kg)?;
    let (lo, hi) = PLAUSIBLE_MASS_KG;
    if body_mass_kg < lo || body_mass_kg > hi {
        warn!("body mass {body_mass_kg} kg is outside the usual {lo}-{hi} kg range");
    }

    let mut out = Normalized::default();
    for sample in samples {
        let Some(watts) = sample.sample.power.as_f64() else {
            out.dropped += 1;
            continue;
        };
        if watts > 0.0 {
            out.active.push(out.samples.len());
        }
        out.samples.push(EnrichedSample {
            power_per_mass: Some(watts / body_mass_kg),
            ..sample.clone()
        });
    }
    debug!(
        "normalized {} samples ({} active, {} non-numeric power)",
        out.samples.len(),
        out.active.len(),
        out.dropped
    );
    Ok(out)
}
