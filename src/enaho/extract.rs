// src/enaho/extract.rs

use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};
use zip::ZipArchive;

use super::columns::{data_entry, module_stem, ENAHO_COLS};
use super::sav::read_sav;
use super::table::SurveyTable;

/// Pull `Enaho01-{year}-100.sav` out of `{raw_dir}/{module}-Modulo01.zip`,
/// read the whitelisted columns, then remove the extracted file and its folder.
#[instrument(level = "info", skip(raw_dir), fields(raw = %raw_dir.as_ref().display()))]
pub fn extract_data<P: AsRef<Path>>(raw_dir: P, year: i32, module_code: u32) -> Result<SurveyTable> {
    let raw_dir = raw_dir.as_ref();
    let stem = module_stem(module_code);
    let zip_path = raw_dir.join(format!("{}.zip", stem));
    let entry_name = data_entry(year, module_code);

    // 1) extract the single data file
    info!(entry = %entry_name, zip = %zip_path.display(), "extracting");
    let stem_dir = raw_dir.join(&stem);
    let data_path = match extract_entry(&zip_path, &entry_name, raw_dir) {
        Ok(p) => p,
        Err(e) => {
            // a failed copy can leave a partial file behind
            cleanup(&raw_dir.join(&entry_name), &stem_dir);
            return Err(e);
        }
    };

    // 2) read the whitelist, then clean up whatever happened
    info!(file = %data_path.display(), "reading survey data");
    let table = read_sav(&data_path, Some(ENAHO_COLS));
    cleanup(&data_path, &stem_dir);
    let table = table?;

    info!(rows = table.num_rows(), columns = table.column_names().len(), "extracted");
    Ok(table)
}

/// Copy `entry_name` from the archive to `dest_dir/entry_name`, returning the written path.
fn extract_entry(zip_path: &Path, entry_name: &str, dest_dir: &Path) -> Result<PathBuf> {
    let file = File::open(zip_path)
        .with_context(|| format!("Failed to open ZIP file: {:?}", zip_path))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {:?}", zip_path))?;
    let mut entry = archive
        .by_name(entry_name)
        .with_context(|| format!("{} not found in {:?}", entry_name, zip_path))?;

    let out_path = dest_dir.join(entry_name);
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut out = File::create(&out_path)
        .with_context(|| format!("creating {}", out_path.display()))?;
    io::copy(&mut entry, &mut out).with_context(|| format!("extracting {}", entry_name))?;
    Ok(out_path)
}

fn cleanup(data_path: &Path, stem_dir: &Path) {
    match fs::remove_file(data_path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            warn!("failed to delete {}: {}", data_path.display(), e)
        }
        _ => {}
    }
    match fs::remove_dir(stem_dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            warn!("failed to remove {}: {}", stem_dir.display(), e)
        }
        _ => {}
    }
}
