//! The fixed soil parameter set returned by the prediction service.
//!
//! Every prediction response carries one numeric value per entry below. The
//! table is static data: response keys map one-to-one onto display labels,
//! units, and recommended ranges. Macronutrient ranges are in kg/ha as
//! reported by the backend; screens convert to mg/sample where needed.

/// Static description of one predicted soil parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    /// Key under `predictions` in the backend response.
    pub key: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Display unit. Empty for unitless parameters.
    pub unit: &'static str,
    /// Lower bound of the recommended range.
    pub good_range_min: f64,
    /// Upper bound of the recommended range.
    pub good_range_max: f64,
}

/// Number of parameters in every complete prediction.
pub const PARAMETER_COUNT: usize = 20;

/// The full parameter table, in display order.
pub const SOIL_PARAMETERS: [ParameterSpec; PARAMETER_COUNT] = [
    ParameterSpec {
        key: "ph",
        label: "pH Level",
        unit: "",
        good_range_min: 7.5,
        good_range_max: 9.0,
    },
    ParameterSpec {
        key: "n",
        label: "Total Nitrogen (N)",
        unit: "kg/ha",
        good_range_min: 140.0,
        good_range_max: 280.0,
    },
    ParameterSpec {
        key: "p",
        label: "Phosphorus Content",
        unit: "kg/ha",
        good_range_min: 7.0,
        good_range_max: 14.0,
    },
    ParameterSpec {
        key: "k",
        label: "Potassium Content",
        unit: "kg/ha",
        good_range_min: 300.0,
        good_range_max: 450.0,
    },
    ParameterSpec {
        key: "oc",
        label: "Organic Carbon",
        unit: "%",
        good_range_min: 0.5,
        good_range_max: 0.75,
    },
    ParameterSpec {
        key: "ec",
        label: "Electrical Conductivity",
        unit: "dS/m",
        good_range_min: 0.2,
        good_range_max: 0.8,
    },
    ParameterSpec {
        key: "s_ext",
        label: "Sulfur (S)",
        unit: "ppm",
        good_range_min: 15.0,
        good_range_max: 20.0,
    },
    ParameterSpec {
        key: "ca_ext",
        label: "Calcium (Ca)",
        unit: "ppm",
        good_range_min: 1000.0,
        good_range_max: 2000.0,
    },
    ParameterSpec {
        key: "mg_ext",
        label: "Magnesium (Mg)",
        unit: "ppm",
        good_range_min: 150.0,
        good_range_max: 300.0,
    },
    ParameterSpec {
        key: "fe_ext",
        label: "Iron (Fe)",
        unit: "ppm",
        good_range_min: 4.5,
        good_range_max: 10.0,
    },
    ParameterSpec {
        key: "mn_ext",
        label: "Manganese (Mn)",
        unit: "ppm",
        good_range_min: 1.0,
        good_range_max: 5.0,
    },
    ParameterSpec {
        key: "zn_ext",
        label: "Zinc (Zn)",
        unit: "ppm",
        good_range_min: 0.5,
        good_range_max: 3.0,
    },
    ParameterSpec {
        key: "cu_ext",
        label: "Copper (Cu)",
        unit: "ppm",
        good_range_min: 0.3,
        good_range_max: 1.0,
    },
    ParameterSpec {
        key: "b_ext",
        label: "Boron (B)",
        unit: "ppm",
        good_range_min: 0.5,
        good_range_max: 1.5,
    },
    ParameterSpec {
        key: "mo_ext",
        label: "Molybdenum (Mo)",
        unit: "ppm",
        good_range_min: 0.05,
        good_range_max: 0.1,
    },
    ParameterSpec {
        key: "cl_ext",
        label: "Chlorine (Cl)",
        unit: "ppm",
        good_range_min: 20.0,
        good_range_max: 40.0,
    },
    ParameterSpec {
        key: "sand",
        label: "Sand Fraction",
        unit: "%",
        good_range_min: 40.0,
        good_range_max: 60.0,
    },
    ParameterSpec {
        key: "silt",
        label: "Silt Fraction",
        unit: "%",
        good_range_min: 20.0,
        good_range_max: 40.0,
    },
    ParameterSpec {
        key: "clay",
        label: "Clay Fraction",
        unit: "%",
        good_range_min: 10.0,
        good_range_max: 25.0,
    },
    ParameterSpec {
        key: "moisture",
        label: "Moisture Content",
        unit: "%",
        good_range_min: 30.0,
        good_range_max: 40.0,
    },
];
