// src/enaho/columns.rs

//! ENAHO module 100 column codes used by the pipeline.

pub const YEAR: &str = "AÑO";
pub const CLUSTER: &str = "CONGLOME";
pub const HOUSE: &str = "VIVIENDA";
pub const HOUSEHOLD: &str = "HOGAR";
pub const RESULT: &str = "RESULT";

/// `RESULT` code of a completed interview.
pub const RESULT_COMPLETE: f64 = 1.0;

pub const FACTOR: &str = "FACTOR07";
pub const LONGITUDE: &str = "LONGITUD";
pub const LATITUDE: &str = "LATITUD";

/// Every column read from the survey file; anything else is never materialised.
pub const ENAHO_COLS: &[&str] = &[
    // Key
    YEAR, CLUSTER, HOUSE, HOUSEHOLD, RESULT,
    // Facade
    "P24A", "P24B",
    // Throughface
    "P25$1", "P25$2", "P25$3", "P25$4",
    // House
    "P101", "P102", "P103", "P103A", "P104", "P104A",
    // Sanitation
    "T110", "P110A1", "P110A_MODIFICADA", "P110C", "P110C1", "P110C2", "P110C3", "T111A",
    // Illumination
    "P1121", "P1123", "P1124", "P1125", "P1126",
    // Combustion
    "P1131", "P1132", "P1133", "P1135", "P1136", "P1139", "P1137",
    // Assets
    "P1141", "P1142", "P1143", "P1144",
    // Sampling weight
    FACTOR,
    // Georeference
    LONGITUDE, LATITUDE,
];

/// Archive stem for a module code, e.g. `966-Modulo01`.
pub fn module_stem(module_code: u32) -> String {
    format!("{}-Modulo01", module_code)
}

/// Path of the data file inside the module archive.
pub fn data_entry(year: i32, module_code: u32) -> String {
    format!("{}/Enaho01-{}-100.sav", module_stem(module_code), year)
}
