// src/store/households.rs

use anyhow::{anyhow, Result};
use arrow::{
    array::{
        Array, ArrayRef, BooleanArray, Float64Array, Int16Array, Int32Array, Int8Array,
        StringArray,
    },
    datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use std::{collections::HashMap, sync::Arc};

use super::{column, TableRow};
use crate::households::{
    Assets, Combustion, Facade, House, Household, HouseholdKey, IndexedHousehold, Illumination,
    Sanitation, Throughface,
};

const KEY_COLS: [&str; 4] = ["year", "cluster", "house", "household"];
const INT8_COLS: [&str; 10] = [
    "plastered", "painted", "structure", "wall", "floor", "roof", "rooms", "bedrooms",
    "water_source", "toilet",
];
const BOOL_COLS: [&str; 22] = [
    "paved_road", "dirt_road", "sidewalk", "light_pole", "potable", "water_treatment",
    "transmitted_electricity", "wax", "kerosene", "generated_electricity", "other_source",
    "electricity", "petroleum", "methane", "coal", "wood", "dung", "other_fuel", "landline",
    "phone", "televisor", "internet",
];

fn bools(rows: &[IndexedHousehold], f: impl Fn(&Household) -> Option<bool>) -> ArrayRef {
    Arc::new(rows.iter().map(|r| f(&r.household)).collect::<BooleanArray>())
}

fn int8s(rows: &[IndexedHousehold], f: impl Fn(&Household) -> Option<i8>) -> ArrayRef {
    Arc::new(rows.iter().map(|r| f(&r.household)).collect::<Int8Array>())
}

fn floats(rows: &[IndexedHousehold], f: impl Fn(&IndexedHousehold) -> Option<f64>) -> ArrayRef {
    Arc::new(rows.iter().map(f).collect::<Float64Array>())
}

fn strings(rows: &[IndexedHousehold], f: impl Fn(&HouseholdKey) -> &str) -> ArrayRef {
    Arc::new(rows.iter().map(|r| Some(f(&r.household.key))).collect::<StringArray>())
}

impl TableRow for IndexedHousehold {
    fn schema() -> ArrowSchema {
        let mut fields = vec![
            Field::new("year", ArrowDataType::Int16, false),
            Field::new("cluster", ArrowDataType::Utf8, false),
            Field::new("house", ArrowDataType::Utf8, false),
            Field::new("household", ArrowDataType::Utf8, false),
        ];
        let int8 = |name: &str, nullable| Field::new(name, ArrowDataType::Int8, nullable);
        let boolean = |name: &str, nullable| Field::new(name, ArrowDataType::Boolean, nullable);
        fields.extend([
            int8("plastered", true),
            int8("painted", true),
            boolean("paved_road", true),
            boolean("dirt_road", true),
            boolean("sidewalk", true),
            boolean("light_pole", true),
            int8("structure", false),
            int8("wall", false),
            int8("floor", false),
            int8("roof", false),
            int8("rooms", false),
            int8("bedrooms", false),
            int8("water_source", true),
            boolean("potable", false),
            boolean("water_treatment", false),
            Field::new("water_access", ArrowDataType::Int32, false),
            int8("toilet", true),
            boolean("transmitted_electricity", true),
            boolean("wax", true),
            boolean("kerosene", true),
            boolean("generated_electricity", true),
            boolean("other_source", true),
            boolean("electricity", true),
            boolean("petroleum", true),
            boolean("methane", true),
            boolean("coal", true),
            boolean("wood", true),
            boolean("dung", true),
            boolean("other_fuel", true),
            boolean("landline", true),
            boolean("phone", true),
            boolean("televisor", true),
            boolean("internet", true),
            Field::new("sampling_weight", ArrowDataType::Float64, true),
            Field::new("longitude", ArrowDataType::Float64, true),
            Field::new("latitude", ArrowDataType::Float64, true),
            Field::new("wealth_index", ArrowDataType::Float64, false),
        ]);
        ArrowSchema::new(fields)
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(Int16Array::from_iter_values(
                rows.iter().map(|r| r.household.key.year),
            )),
            strings(rows, |k| &k.cluster),
            strings(rows, |k| &k.house),
            strings(rows, |k| &k.household),
            int8s(rows, |h| h.facade.plastered),
            int8s(rows, |h| h.facade.painted),
            bools(rows, |h| h.throughface.paved_road),
            bools(rows, |h| h.throughface.dirt_road),
            bools(rows, |h| h.throughface.sidewalk),
            bools(rows, |h| h.throughface.light_pole),
            int8s(rows, |h| Some(h.house.structure)),
            int8s(rows, |h| Some(h.house.wall)),
            int8s(rows, |h| Some(h.house.floor)),
            int8s(rows, |h| Some(h.house.roof)),
            int8s(rows, |h| Some(h.house.rooms)),
            int8s(rows, |h| Some(h.house.bedrooms)),
            int8s(rows, |h| h.sanitation.water_source),
            bools(rows, |h| Some(h.sanitation.potable)),
            bools(rows, |h| Some(h.sanitation.water_treatment)),
            Arc::new(Int32Array::from_iter_values(
                rows.iter().map(|r| r.household.sanitation.water_access),
            )),
            int8s(rows, |h| h.sanitation.toilet),
            bools(rows, |h| h.illumination.transmitted_electricity),
            bools(rows, |h| h.illumination.wax),
            bools(rows, |h| h.illumination.kerosene),
            bools(rows, |h| h.illumination.generated_electricity),
            bools(rows, |h| h.illumination.other_source),
            bools(rows, |h| h.combustion.electricity),
            bools(rows, |h| h.combustion.petroleum),
            bools(rows, |h| h.combustion.methane),
            bools(rows, |h| h.combustion.coal),
            bools(rows, |h| h.combustion.wood),
            bools(rows, |h| h.combustion.dung),
            bools(rows, |h| h.combustion.other_fuel),
            bools(rows, |h| h.assets.landline),
            bools(rows, |h| h.assets.phone),
            bools(rows, |h| h.assets.televisor),
            bools(rows, |h| h.assets.internet),
            floats(rows, |r| r.household.sampling_weight),
            floats(rows, |r| r.household.longitude),
            floats(rows, |r| r.household.latitude),
            floats(rows, |r| Some(r.wealth_index)),
        ]
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let year = column::<Int16Array>(batch, KEY_COLS[0])?;
        let keys = KEY_COLS[1..]
            .iter()
            .map(|n| column::<StringArray>(batch, n))
            .collect::<Result<Vec<_>>>()?;
        let i8s = INT8_COLS
            .iter()
            .map(|n| Ok((*n, column::<Int8Array>(batch, n)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        let bs = BOOL_COLS
            .iter()
            .map(|n| Ok((*n, column::<BooleanArray>(batch, n)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        let access = column::<Int32Array>(batch, "water_access")?;
        let weight = column::<Float64Array>(batch, "sampling_weight")?;
        let lon = column::<Float64Array>(batch, "longitude")?;
        let lat = column::<Float64Array>(batch, "latitude")?;
        let index = column::<Float64Array>(batch, "wealth_index")?;

        let opt = |a: &Float64Array, i: usize| a.is_valid(i).then(|| a.value(i));
        (0..batch.num_rows())
            .map(|i| {
                let o8 = |n: &str| {
                    let a = i8s[n];
                    a.is_valid(i).then(|| a.value(i))
                };
                let r8 = |n: &str| o8(n).ok_or_else(|| anyhow!("{} is null in row {}", n, i));
                let ob = |n: &str| {
                    let a = bs[n];
                    a.is_valid(i).then(|| a.value(i))
                };
                let rb = |n: &str| ob(n).ok_or_else(|| anyhow!("{} is null in row {}", n, i));
                Ok(IndexedHousehold {
                    household: Household {
                        key: HouseholdKey {
                            year: year.value(i),
                            cluster: keys[0].value(i).to_string(),
                            house: keys[1].value(i).to_string(),
                            household: keys[2].value(i).to_string(),
                        },
                        facade: Facade {
                            plastered: o8("plastered"),
                            painted: o8("painted"),
                        },
                        throughface: Throughface {
                            paved_road: ob("paved_road"),
                            dirt_road: ob("dirt_road"),
                            sidewalk: ob("sidewalk"),
                            light_pole: ob("light_pole"),
                        },
                        house: House {
                            structure: r8("structure")?,
                            wall: r8("wall")?,
                            floor: r8("floor")?,
                            roof: r8("roof")?,
                            rooms: r8("rooms")?,
                            bedrooms: r8("bedrooms")?,
                        },
                        sanitation: Sanitation {
                            water_source: o8("water_source"),
                            potable: rb("potable")?,
                            water_treatment: rb("water_treatment")?,
                            water_access: access.value(i),
                            toilet: o8("toilet"),
                        },
                        illumination: Illumination {
                            transmitted_electricity: ob("transmitted_electricity"),
                            wax: ob("wax"),
                            kerosene: ob("kerosene"),
                            generated_electricity: ob("generated_electricity"),
                            other_source: ob("other_source"),
                        },
                        combustion: Combustion {
                            electricity: ob("electricity"),
                            petroleum: ob("petroleum"),
                            methane: ob("methane"),
                            coal: ob("coal"),
                            wood: ob("wood"),
                            dung: ob("dung"),
                            other_fuel: ob("other_fuel"),
                        },
                        assets: Assets {
                            landline: ob("landline"),
                            phone: ob("phone"),
                            televisor: ob("televisor"),
                            internet: ob("internet"),
                        },
                        sampling_weight: opt(weight, i),
                        longitude: opt(lon, i),
                        latitude: opt(lat, i),
                    },
                    wealth_index: index.value(i),
                })
            })
            .collect()
    }
}
