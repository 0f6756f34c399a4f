use anyhow::Result;
use peru_poverty_sat::{
    clusters::ClusterAggregate,
    config::ProjectDirs,
    enaho::{columns::ENAHO_COLS, Column, SurveyTable},
    households::IndexedHousehold,
    imagery::IndexEntry,
    pipeline::index_households,
    store,
};
use tempfile::tempdir;

/// Three completed interviews in cluster 001 that differ in dwelling size
/// and assets, plus one incomplete interview.
fn survey() -> Result<SurveyTable> {
    let rooms = [1.0, 2.0, 4.0];
    let mut table = SurveyTable::new();
    for &code in ENAHO_COLS {
        let column = match code {
            "AÑO" => Column::Text(vec!["2024".into(); 4]),
            "CONGLOME" => Column::Text(vec!["001".into(); 4]),
            "VIVIENDA" => Column::Text(vec!["01".into(), "02".into(), "03".into(), "04".into()]),
            "HOGAR" => Column::Text(vec!["11".into(); 4]),
            "RESULT" => Column::Numeric(vec![Some(1.0), Some(1.0), Some(1.0), Some(3.0)]),
            "P104" | "P104A" => Column::Numeric(
                rooms.iter().map(|r| Some(*r)).chain([Some(9.0)]).collect(),
            ),
            "P1142" | "P1144" => {
                Column::Numeric(vec![Some(0.0), Some(1.0), Some(1.0), Some(1.0)])
            }
            "FACTOR07" => Column::Numeric(vec![Some(100.0), Some(50.0), Some(250.0), None]),
            "LONGITUD" => Column::Numeric(vec![Some(-77.05), Some(-77.05), None, None]),
            "LATITUD" => Column::Numeric(vec![Some(-12.05), Some(-12.05), None, None]),
            _ => Column::Numeric(vec![None; 4]),
        };
        table.push_column(code, column)?;
    }
    Ok(table)
}

#[test]
fn survey_to_cluster_index() -> Result<()> {
    let tables = index_households(&survey()?)?;

    // incomplete interview dropped
    assert_eq!(tables.households.len(), 3);
    let idx: Vec<f64> = tables.households.iter().map(|h| h.wealth_index).collect();
    assert!(idx.windows(2).all(|w| w[0] < w[1]), "{:?}", idx);

    assert_eq!(tables.clusters.len(), 1);
    let c = &tables.clusters[0];
    assert_eq!((c.year, c.cluster.as_str(), c.size), (2024, "001", 3));
    let expected = (idx[0] * 100.0 + idx[1] * 50.0 + idx[2] * 250.0) / 400.0;
    assert!((c.wealth_index - expected).abs() < 1e-12);
    // mean over the households that report a point
    assert!((c.longitude.unwrap() - (-77.05)).abs() < 1e-12);
    assert!((c.latitude.unwrap() - (-12.05)).abs() < 1e-12);
    Ok(())
}

#[test]
fn tables_persist_under_project_layout() -> Result<()> {
    let root = tempdir()?;
    let dirs = ProjectDirs::new(root.path());
    dirs.create_all()?;

    let tables = index_households(&survey()?)?;
    store::write_rows(&dirs.households_path(), &tables.households)?;
    store::write_rows(&dirs.clusters_path(), &tables.clusters)?;
    let index: Vec<IndexEntry> = tables.clusters.iter().cloned().map(IndexEntry::from).collect();
    store::write_rows(&dirs.index_path(), &index)?;

    let households: Vec<IndexedHousehold> = store::read_rows(&dirs.households_path())?;
    let clusters: Vec<ClusterAggregate> = store::read_rows(&dirs.clusters_path())?;
    let index: Vec<IndexEntry> = store::read_rows(&dirs.index_path())?;
    assert_eq!(households, tables.households);
    assert_eq!(clusters, tables.clusters);
    assert_eq!(index[0].filename, "2024_001");
    assert!(root.path().join("data/processed/ENAHOS2/index.parquet").is_file());
    Ok(())
}
