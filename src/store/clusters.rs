// src/store/clusters.rs

use anyhow::Result;
use arrow::{
    array::{Array, ArrayRef, Float64Array, Int16Array, Int64Array, StringArray},
    datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use super::{column, TableRow};
use crate::clusters::ClusterAggregate;
use crate::imagery::IndexEntry;

fn cluster_fields() -> Vec<Field> {
    vec![
        Field::new("year", ArrowDataType::Int16, false),
        Field::new("cluster", ArrowDataType::Utf8, false),
        Field::new("wealth_index", ArrowDataType::Float64, false),
        Field::new("longitude", ArrowDataType::Float64, true),
        Field::new("latitude", ArrowDataType::Float64, true),
        Field::new("size", ArrowDataType::Int64, false),
    ]
}

fn cluster_arrays<'a>(rows: impl Iterator<Item = &'a ClusterAggregate> + Clone) -> Vec<ArrayRef> {
    vec![
        Arc::new(Int16Array::from_iter_values(rows.clone().map(|c| c.year))),
        Arc::new(
            rows.clone()
                .map(|c| Some(c.cluster.as_str()))
                .collect::<StringArray>(),
        ),
        Arc::new(Float64Array::from_iter_values(
            rows.clone().map(|c| c.wealth_index),
        )),
        Arc::new(rows.clone().map(|c| c.longitude).collect::<Float64Array>()),
        Arc::new(rows.clone().map(|c| c.latitude).collect::<Float64Array>()),
        Arc::new(Int64Array::from_iter_values(rows.map(|c| c.size))),
    ]
}

fn clusters_from_batch(batch: &RecordBatch) -> Result<Vec<ClusterAggregate>> {
    let year = column::<Int16Array>(batch, "year")?;
    let cluster = column::<StringArray>(batch, "cluster")?;
    let index = column::<Float64Array>(batch, "wealth_index")?;
    let lon = column::<Float64Array>(batch, "longitude")?;
    let lat = column::<Float64Array>(batch, "latitude")?;
    let size = column::<Int64Array>(batch, "size")?;

    let opt = |a: &Float64Array, i: usize| a.is_valid(i).then(|| a.value(i));
    Ok((0..batch.num_rows())
        .map(|i| ClusterAggregate {
            year: year.value(i),
            cluster: cluster.value(i).to_string(),
            wealth_index: index.value(i),
            longitude: opt(lon, i),
            latitude: opt(lat, i),
            size: size.value(i),
        })
        .collect())
}

impl TableRow for ClusterAggregate {
    fn schema() -> ArrowSchema {
        ArrowSchema::new(cluster_fields())
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        cluster_arrays(rows.iter())
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        clusters_from_batch(batch)
    }
}

/// `index.parquet`: the cluster columns plus the image file stem.
impl TableRow for IndexEntry {
    fn schema() -> ArrowSchema {
        let mut fields = cluster_fields();
        fields.push(Field::new("filename", ArrowDataType::Utf8, false));
        ArrowSchema::new(fields)
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        let mut arrays = cluster_arrays(rows.iter().map(|r| &r.cluster));
        arrays.push(Arc::new(
            rows.iter()
                .map(|r| Some(r.filename.as_str()))
                .collect::<StringArray>(),
        ));
        arrays
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let filename = column::<StringArray>(batch, "filename")?;
        Ok(clusters_from_batch(batch)?
            .into_iter()
            .enumerate()
            .map(|(i, cluster)| IndexEntry {
                cluster,
                filename: filename.value(i).to_string(),
            })
            .collect())
    }
}
