// src/households/mod.rs

//! Household feature records derived from raw survey rows.

pub mod features;

pub use features::process_households;

/// (year, cluster, house, household)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HouseholdKey {
    pub year: i16,
    pub cluster: String,
    pub house: String,
    pub household: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facade {
    pub plastered: Option<i8>,
    pub painted: Option<i8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Throughface {
    pub paved_road: Option<bool>,
    pub dirt_road: Option<bool>,
    pub sidewalk: Option<bool>,
    pub light_pole: Option<bool>,
}

/// Dwelling structure. Unreported codes are backfilled to 0, the lowest tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct House {
    pub structure: i8,
    pub wall: i8,
    pub floor: i8,
    pub roof: i8,
    pub rooms: i8,
    pub bedrooms: i8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sanitation {
    pub water_source: Option<i8>,
    pub potable: bool,
    pub water_treatment: bool,
    pub water_access: i32,
    pub toilet: Option<i8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Illumination {
    pub transmitted_electricity: Option<bool>,
    pub wax: Option<bool>,
    pub kerosene: Option<bool>,
    pub generated_electricity: Option<bool>,
    pub other_source: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Combustion {
    pub electricity: Option<bool>,
    pub petroleum: Option<bool>,
    pub methane: Option<bool>,
    pub coal: Option<bool>,
    pub wood: Option<bool>,
    pub dung: Option<bool>,
    pub other_fuel: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assets {
    pub landline: Option<bool>,
    pub phone: Option<bool>,
    pub televisor: Option<bool>,
    pub internet: Option<bool>,
}

/// One completed household interview, normalised so that higher means better.
#[derive(Debug, Clone, PartialEq)]
pub struct Household {
    pub key: HouseholdKey,
    pub facade: Facade,
    pub throughface: Throughface,
    pub house: House,
    pub sanitation: Sanitation,
    pub illumination: Illumination,
    pub combustion: Combustion,
    pub assets: Assets,
    pub sampling_weight: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

/// A household with its fitted wealth index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedHousehold {
    pub household: Household,
    pub wealth_index: f64,
}

pub const N_FEATURES: usize = 35;

/// Feature columns fed to the wealth index, in order.
pub const FEATURE_COLS: [&str; N_FEATURES] = [
    // facade
    "plastered", "painted",
    // throughface
    "paved_road", "dirt_road", "sidewalk", "light_pole",
    // house
    "structure", "wall", "floor", "roof", "rooms", "bedrooms",
    // sanitation
    "water_source", "potable", "water_treatment", "water_access", "toilet",
    // illumination
    "transmitted_electricity", "wax", "kerosene", "generated_electricity", "other_source",
    // combustion
    "electricity", "petroleum", "methane", "coal", "wood", "dung", "other_fuel",
    // assets
    "landline", "phone", "televisor", "internet",
    // georeference
    "longitude", "latitude",
];

fn ord(v: Option<i8>) -> Option<f64> {
    v.map(f64::from)
}

fn flag(v: Option<bool>) -> Option<f64> {
    v.map(|b| if b { 1.0 } else { 0.0 })
}

fn num(v: i8) -> Option<f64> {
    Some(f64::from(v))
}

impl Household {
    /// Feature vector in `FEATURE_COLS` order; `None` marks a missing value.
    pub fn features(&self) -> [Option<f64>; N_FEATURES] {
        let (f, t, h, s) = (&self.facade, &self.throughface, &self.house, &self.sanitation);
        let (i, c, a) = (&self.illumination, &self.combustion, &self.assets);
        [
            ord(f.plastered),
            ord(f.painted),
            flag(t.paved_road),
            flag(t.dirt_road),
            flag(t.sidewalk),
            flag(t.light_pole),
            num(h.structure),
            num(h.wall),
            num(h.floor),
            num(h.roof),
            num(h.rooms),
            num(h.bedrooms),
            ord(s.water_source),
            flag(Some(s.potable)),
            flag(Some(s.water_treatment)),
            Some(f64::from(s.water_access)),
            ord(s.toilet),
            flag(i.transmitted_electricity),
            flag(i.wax),
            flag(i.kerosene),
            flag(i.generated_electricity),
            flag(i.other_source),
            flag(c.electricity),
            flag(c.petroleum),
            flag(c.methane),
            flag(c.coal),
            flag(c.wood),
            flag(c.dung),
            flag(c.other_fuel),
            flag(a.landline),
            flag(a.phone),
            flag(a.televisor),
            flag(a.internet),
            self.longitude,
            self.latitude,
        ]
    }
}
