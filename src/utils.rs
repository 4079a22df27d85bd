//! Utility functions for the agrow-probe-ble crate.

/// Mass of one analysis sample relative to a hectare of topsoil.
const KG_HA_PER_MG_SAMPLE: f64 = 0.064;

/// Convert a field-scale nutrient value (kg/ha) to a per-sample value
/// (mg/sample).
///
/// The backend reports macronutrients in kg/ha; report screens show both
/// units.
///
/// # Example
///
/// ```
/// use agrow_probe_ble::kg_ha_to_mg_sample;
///
/// let mg = kg_ha_to_mg_sample(140.0);
/// assert!((mg - 8.96).abs() < 0.001);
/// ```
#[inline]
pub fn kg_ha_to_mg_sample(kg_ha: f64) -> f64 {
    kg_ha * KG_HA_PER_MG_SAMPLE
}

/// Convert a per-sample nutrient value (mg/sample) back to kg/ha.
///
/// # Example
///
/// ```
/// use agrow_probe_ble::mg_sample_to_kg_ha;
///
/// let kg_ha = mg_sample_to_kg_ha(8.96);
/// assert!((kg_ha - 140.0).abs() < 0.001);
/// ```
#[inline]
pub fn mg_sample_to_kg_ha(mg_sample: f64) -> f64 {
    mg_sample / KG_HA_PER_MG_SAMPLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kg_ha_to_mg_sample() {
        assert!((kg_ha_to_mg_sample(280.0) - 17.92).abs() < 0.001);
        assert!((kg_ha_to_mg_sample(300.0) - 19.2).abs() < 0.001);
        assert!((kg_ha_to_mg_sample(0.0)).abs() < 0.001);
    }

    #[test]
    fn test_conversion_roundtrip() {
        let original = 156.8;
        let converted = mg_sample_to_kg_ha(kg_ha_to_mg_sample(original));
        assert!((converted - original).abs() < 0.0001);
    }
}
