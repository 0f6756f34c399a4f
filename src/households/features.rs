// src/households/features.rs

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, instrument};

use super::{
    Assets, Combustion, Facade, House, Household, HouseholdKey, Illumination, Sanitation,
    Throughface,
};
use crate::enaho::columns::{
    CLUSTER, ENAHO_COLS, FACTOR, HOUSE, HOUSEHOLD, LATITUDE, LONGITUDE, RESULT, RESULT_COMPLETE,
    YEAR,
};
use crate::enaho::{RawRecord, SurveyTable};

/// Raw code bounds for "1 = best" ordinal scales. The mapped value is
/// `max_code + 1 - raw`.
pub const PLASTERED_MAX: i8 = 3;
pub const PAINTED_MAX: i8 = 2;
pub const STRUCTURE_MAX: i8 = 7;
pub const WALL_MAX: i8 = 8;
pub const FLOOR_MAX: i8 = 6;
pub const ROOF_MAX: i8 = 7;
pub const WATER_SOURCE_MAX: i8 = 8;
pub const TOILET_MAX: i8 = 10;

/// Water treatment codes counted as treated.
const TREATMENT_RANGE: std::ops::RangeInclusive<f64> = 0.5..=5.0;

/// Build one `Household` per completed interview (`RESULT == 1`).
#[instrument(level = "info", skip(enaho), fields(rows = enaho.num_rows()))]
pub fn process_households(enaho: &SurveyTable) -> Result<Vec<Household>> {
    enaho.require(ENAHO_COLS)?;

    let households = enaho
        .records()
        .filter(|r| r.num(RESULT) == Some(RESULT_COMPLETE))
        .map(|r| household(&r).with_context(|| format!("mapping survey row {}", r.row())))
        .collect::<Result<Vec<_>>>()?;

    info!(
        households = households.len(),
        dropped = enaho.num_rows() - households.len(),
        "mapped completed interviews"
    );
    Ok(households)
}

fn household(r: &RawRecord<'_>) -> Result<Household> {
    Ok(Household {
        key: key(r)?,
        facade: facade(r)?,
        throughface: throughface(r),
        house: house(r)?,
        sanitation: sanitation(r)?,
        illumination: illumination(r),
        combustion: combustion(r),
        assets: assets(r),
        sampling_weight: r.num(FACTOR),
        longitude: r.num(LONGITUDE),
        latitude: r.num(LATITUDE),
    })
}

fn key(r: &RawRecord<'_>) -> Result<HouseholdKey> {
    let year = integer(r, YEAR)?.ok_or_else(|| anyhow!("{} is missing", YEAR))?;
    let text = |code: &str| r.text(code).ok_or_else(|| anyhow!("{} is missing", code));
    Ok(HouseholdKey {
        year: i16::try_from(year).with_context(|| format!("{} out of range: {}", YEAR, year))?,
        cluster: text(CLUSTER)?,
        house: text(HOUSE)?,
        household: text(HOUSEHOLD)?,
    })
}

fn facade(r: &RawRecord<'_>) -> Result<Facade> {
    Ok(Facade {
        plastered: invert(code(r, "P24A")?, PLASTERED_MAX),
        painted: invert(code(r, "P24B")?, PAINTED_MAX),
    })
}

fn throughface(r: &RawRecord<'_>) -> Throughface {
    Throughface {
        paved_road: flag(r, "P25$1"),
        dirt_road: flag(r, "P25$2"),
        sidewalk: flag(r, "P25$3"),
        light_pole: flag(r, "P25$4"),
    }
}

fn house(r: &RawRecord<'_>) -> Result<House> {
    Ok(House {
        structure: invert(code(r, "P101")?, STRUCTURE_MAX).unwrap_or(0),
        wall: invert(code(r, "P102")?, WALL_MAX).unwrap_or(0),
        floor: invert(code(r, "P103")?, FLOOR_MAX).unwrap_or(0),
        roof: invert(code(r, "P103A")?, ROOF_MAX).unwrap_or(0),
        rooms: code(r, "P104")?.unwrap_or(0),
        bedrooms: code(r, "P104A")?.unwrap_or(0),
    })
}

fn sanitation(r: &RawRecord<'_>) -> Result<Sanitation> {
    let has_access = code(r, "P110C")?.map(|c| c == 1);
    Ok(Sanitation {
        water_source: invert(code(r, "T110")?, WATER_SOURCE_MAX),
        potable: code(r, "P110A1")? == Some(1),
        water_treatment: r
            .num("P110A_MODIFICADA")
            .is_some_and(|v| TREATMENT_RANGE.contains(&v)),
        water_access: water_access(
            has_access,
            integer(r, "P110C1")?,
            integer(r, "P110C2")?,
            integer(r, "P110C3")?,
        )?,
        toilet: invert(code(r, "T111A")?, TOILET_MAX),
    })
}

fn illumination(r: &RawRecord<'_>) -> Illumination {
    Illumination {
        transmitted_electricity: flag(r, "P1121"),
        wax: flag(r, "P1123"),
        kerosene: flag(r, "P1124"),
        generated_electricity: flag(r, "P1125"),
        other_source: flag(r, "P1126"),
    }
}

fn combustion(r: &RawRecord<'_>) -> Combustion {
    Combustion {
        electricity: flag(r, "P1131"),
        petroleum: flag(r, "P1132"),
        methane: flag(r, "P1133"),
        coal: flag(r, "P1135"),
        wood: flag(r, "P1136"),
        dung: flag(r, "P1139"),
        other_fuel: flag(r, "P1137"),
    }
}

fn assets(r: &RawRecord<'_>) -> Assets {
    Assets {
        landline: flag(r, "P1141"),
        phone: flag(r, "P1142"),
        televisor: flag(r, "P1143"),
        internet: flag(r, "P1144"),
    }
}

/// `max_code + 1 - raw`, missing stays missing.
pub fn invert(raw: Option<i8>, max_code: i8) -> Option<i8> {
    raw.map(|x| (max_code + 1).saturating_sub(x))
}

/// Days of access per week: `freq * 7` with continuous access, otherwise
/// `times * amount`. Anything unreported resolves to 0; a product outside
/// `i32` is an error.
pub fn water_access(
    has_access: Option<bool>,
    freq: Option<i64>,
    times: Option<i64>,
    amount: Option<i64>,
) -> Result<i32> {
    let v = if has_access == Some(true) {
        freq.map(|f| f.checked_mul(7).ok_or_else(|| anyhow!("P110C1 * 7 overflows: {}", f)))
    } else {
        times.zip(amount).map(|(t, a)| {
            t.checked_mul(a)
                .ok_or_else(|| anyhow!("P110C2 * P110C3 overflows: {} * {}", t, a))
        })
    };
    match v.transpose()? {
        None => Ok(0),
        Some(x) => i32::try_from(x).with_context(|| format!("water access out of range: {}", x)),
    }
}

/// Presence/absence code: nonzero is present.
fn flag(r: &RawRecord<'_>, code: &str) -> Option<bool> {
    r.num(code).map(|v| v != 0.0)
}

fn integer(r: &RawRecord<'_>, code: &str) -> Result<Option<i64>> {
    match r.num(code) {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(Some(v as i64)),
        Some(v) => bail!("{} is not an integer code: {}", code, v),
    }
}

fn code(r: &RawRecord<'_>, code: &str) -> Result<Option<i8>> {
    integer(r, code)?
        .map(|v| i8::try_from(v).with_context(|| format!("{} code out of range: {}", code, v)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enaho::Column;

    /// Build a table with every whitelisted column, each row given as overrides.
    fn table(rows: &[&[(&str, Option<f64>)]]) -> Result<SurveyTable> {
        let mut t = SurveyTable::new();
        for &col in ENAHO_COLS {
            let column = match col {
                c if c == YEAR => Column::Text(vec!["2024".into(); rows.len()]),
                c if c == CLUSTER => Column::Text(vec!["001".into(); rows.len()]),
                c if c == HOUSE => Column::Text(
                    (0..rows.len()).map(|i| format!("{:02}", i + 1)).collect(),
                ),
                c if c == HOUSEHOLD => Column::Text(vec!["11".into(); rows.len()]),
                _ => Column::Numeric(
                    rows.iter()
                        .map(|row| {
                            row.iter()
                                .find(|(c, _)| *c == col)
                                .and_then(|(_, v)| *v)
                                .or(if col == RESULT { Some(1.0) } else { None })
                        })
                        .collect(),
                ),
            };
            t.push_column(col, column)?;
        }
        Ok(t)
    }

    #[test]
    fn keeps_only_completed_interviews() -> Result<()> {
        let t = table(&[
            &[("RESULT", Some(1.0))],
            &[("RESULT", Some(2.0))],
            &[("RESULT", Some(3.0))],
            &[("RESULT", Some(1.0))],
        ])?;
        let hh = process_households(&t)?;
        assert_eq!(hh.len(), 2);
        assert_eq!(hh[0].key.house, "01");
        assert_eq!(hh[1].key.house, "04");
        assert_eq!(hh[0].key.year, 2024);
        assert_eq!(hh[0].key.cluster, "001");
        Ok(())
    }

    #[test]
    fn ordinal_inversion_sums_to_max_plus_one() -> Result<()> {
        let cases = [
            ("P24A", PLASTERED_MAX),
            ("P24B", PAINTED_MAX),
            ("P101", STRUCTURE_MAX),
            ("P102", WALL_MAX),
            ("P103", FLOOR_MAX),
            ("P103A", ROOF_MAX),
            ("T110", WATER_SOURCE_MAX),
            ("T111A", TOILET_MAX),
        ];
        for (code, max) in cases {
            for raw in 1..=max {
                let row: &[(&str, Option<f64>)] = &[(code, Some(raw as f64))];
                let hh = process_households(&table(&[row])?)?;
                let h = &hh[0];
                let mapped = match code {
                    "P24A" => h.facade.plastered,
                    "P24B" => h.facade.painted,
                    "P101" => Some(h.house.structure),
                    "P102" => Some(h.house.wall),
                    "P103" => Some(h.house.floor),
                    "P103A" => Some(h.house.roof),
                    "T110" => h.sanitation.water_source,
                    _ => h.sanitation.toilet,
                };
                assert_eq!(mapped.map(|m| m + raw), Some(max + 1), "{} raw {}", code, raw);
            }
        }
        Ok(())
    }

    #[test]
    fn missing_ordinals_stay_missing_except_dwelling() -> Result<()> {
        let hh = process_households(&table(&[&[]])?)?;
        let h = &hh[0];
        assert_eq!(h.facade.plastered, None);
        assert_eq!(h.facade.painted, None);
        assert_eq!(h.sanitation.water_source, None);
        assert_eq!(h.sanitation.toilet, None);
        assert_eq!(h.house, House::default());
        assert!(!h.sanitation.potable);
        assert!(!h.sanitation.water_treatment);
        assert_eq!(h.sanitation.water_access, 0);
        assert_eq!(h.assets.phone, None);
        assert_eq!(h.sampling_weight, None);
        Ok(())
    }

    #[test]
    fn boolean_recodes() -> Result<()> {
        let t = table(&[&[
            ("P25$1", Some(1.0)),
            ("P25$2", Some(0.0)),
            ("P1121", Some(1.0)),
            ("P1136", Some(0.0)),
            ("P1144", Some(1.0)),
        ]])?;
        let h = &process_households(&t)?[0];
        assert_eq!(h.throughface.paved_road, Some(true));
        assert_eq!(h.throughface.dirt_road, Some(false));
        assert_eq!(h.throughface.sidewalk, None);
        assert_eq!(h.illumination.transmitted_electricity, Some(true));
        assert_eq!(h.combustion.wood, Some(false));
        assert_eq!(h.assets.internet, Some(true));
        Ok(())
    }

    #[test]
    fn water_features() -> Result<()> {
        let t = table(&[
            &[("P110C", Some(1.0)), ("P110C1", Some(3.0)), ("P110C2", Some(4.0)), ("P110C3", Some(5.0))],
            &[("P110C", Some(2.0)), ("P110C1", Some(3.0)), ("P110C2", Some(4.0)), ("P110C3", Some(5.0))],
            &[("P110C", Some(2.0)), ("P110C2", Some(4.0))],
            &[("P110C", Some(1.0))],
            &[("P110A1", Some(1.0)), ("P110A_MODIFICADA", Some(0.5))],
            &[("P110A1", Some(2.0)), ("P110A_MODIFICADA", Some(5.5))],
        ])?;
        let hh = process_households(&t)?;
        let access: Vec<i32> = hh.iter().map(|h| h.sanitation.water_access).collect();
        assert_eq!(access, vec![21, 20, 0, 0, 0, 0]);
        assert!(hh[4].sanitation.potable && hh[4].sanitation.water_treatment);
        assert!(!hh[5].sanitation.potable && !hh[5].sanitation.water_treatment);
        Ok(())
    }

    #[test]
    fn water_access_rules() -> Result<()> {
        assert_eq!(water_access(Some(true), Some(2), Some(9), Some(9))?, 14);
        assert_eq!(water_access(Some(false), Some(2), Some(3), Some(6))?, 18);
        assert_eq!(water_access(None, None, Some(3), Some(6))?, 18);
        assert_eq!(water_access(Some(true), None, Some(3), Some(6))?, 0);
        assert_eq!(water_access(None, None, None, None)?, 0);
        Ok(())
    }

    #[test]
    fn oversized_water_access_is_an_error() -> Result<()> {
        assert!(water_access(Some(false), None, Some(5_000_000_000), Some(5_000_000_000)).is_err());
        assert!(water_access(Some(true), Some(i64::MAX), None, None).is_err());
        // fits i64 but not i32
        assert!(water_access(Some(false), None, Some(100_000), Some(100_000)).is_err());

        let t = table(&[&[
            ("P110C", Some(2.0)),
            ("P110C2", Some(5e9)),
            ("P110C3", Some(5e9)),
        ]])?;
        let err = process_households(&t).unwrap_err();
        assert!(format!("{:#}", err).contains("overflows"), "{:#}", err);
        Ok(())
    }

    #[test]
    fn non_integer_code_is_an_error() -> Result<()> {
        let t = table(&[&[("P101", Some(2.5))]])?;
        let err = process_households(&t).unwrap_err();
        assert!(format!("{:#}", err).contains("P101"));
        Ok(())
    }

    #[test]
    fn missing_whitelisted_column_is_an_error() -> Result<()> {
        let mut t = SurveyTable::new();
        t.push_column(RESULT, Column::Numeric(vec![Some(1.0)]))?;
        assert!(process_households(&t).is_err());
        Ok(())
    }
}
