//! Persona provisioner
//!
//! A sample's panel is generated once, persisted, and reused by every later
//! run against the same sample. Persistence is best-effort: the pipeline
//! never fails because a panel could not be read or written.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use psycsim_state::{PanelInsert, PanelRecord, SampleStore};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use super::catalog::PERSONA_CATALOG;
use crate::domain::{AttributePool, CoreResult, Persona, SampleSpec};
use crate::obs;

/// Label that triggers age-range expansion.
pub const AGE_LABEL: &str = "Age";

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("integer pattern is valid"))
}

/// Expand an age value.
///
/// Two embedded integers draw a uniform integer from that inclusive range
/// (order-insensitive); one embedded integer is returned verbatim; anything
/// else, including integers too large for `u64`, is returned unchanged.
pub fn parse_age_range<R: Rng + ?Sized>(value: &str, rng: &mut R) -> String {
    let Ok(numbers) = integer_pattern()
        .find_iter(value)
        .take(2)
        .map(|m| m.as_str().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
    else {
        return value.to_string();
    };

    match numbers.as_slice() {
        [a, b] => {
            let (lo, hi) = if a <= b { (*a, *b) } else { (*b, *a) };
            rng.gen_range(lo..=hi).to_string()
        }
        [only] => only.to_string(),
        _ => value.to_string(),
    }
}

/// Draw `panel_size` personas from attribute pools.
///
/// Each pool contributes one independently drawn value per persona; pools
/// with no values are skipped.
pub fn generate_panel<R: Rng + ?Sized>(
    pools: &[AttributePool],
    panel_size: usize,
    rng: &mut R,
) -> Vec<Persona> {
    (0..panel_size)
        .map(|slot| {
            let mut attributes = BTreeMap::new();
            for pool in pools {
                let Some(value) = pool.values.choose(rng) else {
                    continue;
                };
                let value = if pool.label == AGE_LABEL {
                    parse_age_range(value, rng)
                } else {
                    value.clone()
                };
                attributes.insert(pool.label.clone(), value);
            }
            Persona::with_attributes(slot as u32 + 1, attributes)
        })
        .collect()
}

/// Draw `panel_size` free-text personas from the catalog, without
/// replacement until it is exhausted and with replacement after that.
pub fn draw_from_catalog<R: Rng + ?Sized>(panel_size: usize, rng: &mut R) -> Vec<Persona> {
    let mut order: Vec<&str> = PERSONA_CATALOG.to_vec();
    order.shuffle(rng);

    (0..panel_size)
        .map(|slot| {
            let description = match order.get(slot) {
                Some(text) => *text,
                None => PERSONA_CATALOG
                    .choose(rng)
                    .copied()
                    .unwrap_or_default(),
            };
            Persona::with_description(slot as u32 + 1, description)
        })
        .collect()
}

/// Where a provisioned panel came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelOrigin {
    /// Loaded from the sample store.
    Reused,
    /// Freshly generated and persisted.
    Generated,
    /// Freshly generated but not persisted (store read or write failed).
    GeneratedUnsaved,
}

/// Result of provisioning a panel.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionOutcome {
    /// Personas sorted by `number`.
    pub personas: Vec<Persona>,
    pub origin: PanelOrigin,
    /// Recoverable store failure, if one occurred.
    pub store_error: Option<String>,
}

/// Provides the persona panel for a sample.
pub struct PersonaProvisioner {
    samples: Arc<dyn SampleStore>,
}

impl PersonaProvisioner {
    pub fn new(samples: Arc<dyn SampleStore>) -> Self {
        Self { samples }
    }

    /// Return the sample's stored panel, or generate (and try to persist) one.
    #[instrument(skip_all, fields(stage = "personas", sample_id = %sample.id, panel_size = panel_size))]
    pub async fn provision<R: Rng + Send + ?Sized>(
        &self,
        sample: &SampleSpec,
        panel_size: usize,
        rng: &mut R,
    ) -> ProvisionOutcome {
        let stored = match self.samples.get_panel(&sample.id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(sample_id = %sample.id, error = %e, "panel lookup failed, generating without persisting");
                return ProvisionOutcome {
                    personas: fresh_panel(sample, panel_size, rng),
                    origin: PanelOrigin::GeneratedUnsaved,
                    store_error: Some(e.to_string()),
                };
            }
        };

        if let Some(panel) = stored {
            match decode_panel(panel) {
                Ok(personas) => {
                    info!(sample_id = %sample.id, personas = personas.len(), "reusing stored panel");
                    return ProvisionOutcome {
                        personas,
                        origin: PanelOrigin::Reused,
                        store_error: None,
                    };
                }
                Err(e) => {
                    warn!(sample_id = %sample.id, error = %e, "stored panel is unreadable, generating without persisting");
                    return ProvisionOutcome {
                        personas: fresh_panel(sample, panel_size, rng),
                        origin: PanelOrigin::GeneratedUnsaved,
                        store_error: Some(e.to_string()),
                    };
                }
            }
        }

        let personas = fresh_panel(sample, panel_size, rng);
        match self.persist(&sample.id, &personas).await {
            Ok(PanelInsert::Created(_)) => {
                info!(sample_id = %sample.id, personas = personas.len(), "generated and stored panel");
                ProvisionOutcome {
                    personas,
                    origin: PanelOrigin::Generated,
                    store_error: None,
                }
            }
            Ok(PanelInsert::Existing(panel)) => match decode_panel(panel) {
                Ok(stored) => {
                    info!(sample_id = %sample.id, personas = stored.len(), "panel stored concurrently, adopting it");
                    ProvisionOutcome {
                        personas: stored,
                        origin: PanelOrigin::Reused,
                        store_error: None,
                    }
                }
                Err(e) => {
                    warn!(sample_id = %sample.id, error = %e, "concurrently stored panel is unreadable, keeping own panel");
                    ProvisionOutcome {
                        personas,
                        origin: PanelOrigin::GeneratedUnsaved,
                        store_error: Some(e.to_string()),
                    }
                }
            },
            Err(e) => {
                obs::emit_panel_persist_failed(&sample.id, &e);
                ProvisionOutcome {
                    personas,
                    origin: PanelOrigin::GeneratedUnsaved,
                    store_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Create-only write; a panel stored first by another job wins.
    async fn persist(&self, sample_id: &str, personas: &[Persona]) -> CoreResult<PanelInsert> {
        let values = personas
            .iter()
            .map(Persona::to_value)
            .collect::<CoreResult<Vec<_>>>()?;
        let inserted = self
            .samples
            .insert_panel_if_absent(PanelRecord::new(sample_id, values))
            .await?;
        Ok(inserted)
    }
}

fn fresh_panel<R: Rng + ?Sized>(sample: &SampleSpec, panel_size: usize, rng: &mut R) -> Vec<Persona> {
    if sample.attributes.is_empty() {
        debug!(sample_id = %sample.id, "no attribute pools, drawing from catalog");
        draw_from_catalog(panel_size, rng)
    } else {
        generate_panel(&sample.attributes, panel_size, rng)
    }
}

fn decode_panel(panel: PanelRecord) -> CoreResult<Vec<Persona>> {
    let mut personas = panel
        .personas
        .into_iter()
        .map(Persona::from_value)
        .collect::<CoreResult<Vec<_>>>()?;
    personas.sort_by_key(|p| p.number);
    Ok(personas)
}
