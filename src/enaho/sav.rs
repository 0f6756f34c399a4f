// src/enaho/sav.rs

//! Reader for SPSS system files (`.sav`).
//!
//! Supports:
//! - little and big endian files (detected from the layout code)
//! - uncompressed and bytecode-compressed case data
//! - long variable names (extension subtype 13)
//! - UTF-8 / Latin-1 text (extension subtypes 3 and 20)
//! - system-missing and user-missing numeric values (discrete and ranges)
//!
//! zlib-compressed (`$FL3`) files are rejected.

use anyhow::{anyhow, bail, Context, Result};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};
use tracing::{debug, instrument};

use super::table::{Column, SurveyTable};

/// System-missing: the most negative finite double.
pub const SYSMIS: f64 = -f64::MAX;

const HEADER_MAGIC: &[u8; 4] = b"$FL2";
const ZSAV_MAGIC: &[u8; 4] = b"$FL3";
const SLOT: usize = 8;

/// Metadata from the 176-byte file header.
#[derive(Debug, Clone, PartialEq)]
pub struct SavHeader {
    pub product: String,
    pub compression: i32,
    pub nominal_case_size: i32,
    pub ncases: i32,
    pub bias: f64,
    pub file_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {
    fn from_name(name: &str) -> Self {
        let n = name.trim().to_ascii_uppercase();
        if n == "UTF-8" || n == "UTF8" {
            Encoding::Utf8
        } else {
            Encoding::Latin1
        }
    }

    fn from_code_page(code: i32) -> Option<Self> {
        match code {
            65001 => Some(Encoding::Utf8),
            // 1 = EBCDIC, 2/3 = 7/8-bit ASCII; treat the ASCII family as Latin-1
            2 | 3 | 1252 | 28591 => Some(Encoding::Latin1),
            _ => None,
        }
    }

    fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

/// User-missing declaration of a variable, kept as raw 8-byte slots.
#[derive(Debug, Clone, PartialEq)]
enum MissingSpec {
    None,
    Discrete(Vec<[u8; 8]>),
    Range {
        lo: [u8; 8],
        hi: [u8; 8],
        extra: Option<[u8; 8]>,
    },
}

#[derive(Debug, Clone)]
struct Variable {
    short_name: Vec<u8>,
    /// 0 = numeric, otherwise string width in bytes
    width: usize,
    /// index of the first 8-byte slot inside a case
    slot: usize,
    missing: MissingSpec,
}

impl Variable {
    fn slots(&self) -> usize {
        if self.width == 0 {
            1
        } else {
            (self.width + SLOT - 1) / SLOT
        }
    }
}

struct ByteReader<R> {
    inner: R,
    endian: Endian,
}

impl<R: Read> ByteReader<R> {
    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut b = [0u8; N];
        self.inner.read_exact(&mut b)?;
        Ok(b)
    }

    fn vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut b = vec![0u8; n];
        self.inner.read_exact(&mut b)?;
        Ok(b)
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.array::<4>()?;
        Ok(decode_i32(b, self.endian))
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.array::<8>()?;
        Ok(decode_f64(b, self.endian))
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(n as u64), &mut io::sink())?;
        if copied != n as u64 {
            bail!("unexpected end of file while skipping {} bytes", n);
        }
        Ok(())
    }

    /// Read one 8-byte slot; `None` only on a clean EOF before the first byte.
    fn slot_or_eof(&mut self) -> Result<Option<[u8; 8]>> {
        let mut b = [0u8; 8];
        let mut filled = 0;
        while filled < SLOT {
            let n = self.inner.read(&mut b[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                bail!("truncated data slot ({} of 8 bytes)", filled);
            }
            filled += n;
        }
        Ok(Some(b))
    }
}

fn decode_i32(b: [u8; 4], endian: Endian) -> i32 {
    match endian {
        Endian::Little => i32::from_le_bytes(b),
        Endian::Big => i32::from_be_bytes(b),
    }
}

fn decode_f64(b: [u8; 8], endian: Endian) -> f64 {
    match endian {
        Endian::Little => f64::from_le_bytes(b),
        Endian::Big => f64::from_be_bytes(b),
    }
}

fn encode_f64(v: f64, endian: Endian) -> [u8; 8] {
    match endian {
        Endian::Little => v.to_le_bytes(),
        Endian::Big => v.to_be_bytes(),
    }
}

fn trim_name(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |i| i + 1);
    &raw[..end]
}

/// Source of case slots, either raw or bytecode-compressed.
trait SlotSource {
    fn next_slot(&mut self) -> Result<Option<[u8; 8]>>;
}

struct RawSlots<R> {
    reader: ByteReader<R>,
}

impl<R: Read> SlotSource for RawSlots<R> {
    fn next_slot(&mut self) -> Result<Option<[u8; 8]>> {
        self.reader.slot_or_eof()
    }
}

struct BytecodeSlots<R> {
    reader: ByteReader<R>,
    bias: f64,
    commands: [u8; 8],
    pos: usize,
    done: bool,
}

impl<R: Read> BytecodeSlots<R> {
    fn new(reader: ByteReader<R>, bias: f64) -> Self {
        Self {
            reader,
            bias,
            commands: [0; 8],
            pos: SLOT,
            done: false,
        }
    }
}

impl<R: Read> SlotSource for BytecodeSlots<R> {
    fn next_slot(&mut self) -> Result<Option<[u8; 8]>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if self.pos == SLOT {
                match self.reader.slot_or_eof()? {
                    Some(block) => {
                        self.commands = block;
                        self.pos = 0;
                    }
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                }
            }
            let code = self.commands[self.pos];
            self.pos += 1;
            match code {
                0 => continue,
                252 => {
                    self.done = true;
                    return Ok(None);
                }
                253 => {
                    return self
                        .reader
                        .slot_or_eof()?
                        .ok_or_else(|| anyhow!("compressed data ends inside a raw slot"))
                        .map(Some);
                }
                254 => return Ok(Some(*b"        ")),
                255 => return Ok(Some(encode_f64(SYSMIS, self.reader.endian))),
                n => {
                    let v = n as f64 - self.bias;
                    return Ok(Some(encode_f64(v, self.reader.endian)));
                }
            }
        }
    }
}

enum Builder {
    Numeric(Vec<Option<f64>>),
    Text(Vec<String>),
}

/// Read a `.sav` file from disk, keeping only `usecols` (or every column).
#[instrument(level = "info", skip(path, usecols), fields(path = %path.as_ref().display()))]
pub fn read_sav<P: AsRef<Path>>(path: P, usecols: Option<&[&str]>) -> Result<SurveyTable> {
    let file = File::open(&path)
        .with_context(|| format!("opening survey file {}", path.as_ref().display()))?;
    read_sav_from(BufReader::new(file), usecols)
        .with_context(|| format!("reading survey file {}", path.as_ref().display()))
}

/// Read a system file from any reader.
pub fn read_sav_from<R: Read>(reader: R, usecols: Option<&[&str]>) -> Result<SurveyTable> {
    // ─── 1) header ───────────────────────────────────────────────────
    let mut rd = ByteReader {
        inner: reader,
        endian: Endian::Little,
    };
    let magic = rd.array::<4>().context("reading file header")?;
    if &magic == ZSAV_MAGIC {
        bail!("zlib-compressed system files ($FL3) are not supported");
    }
    if &magic != HEADER_MAGIC {
        bail!("not an SPSS system file (magic {:?})", magic);
    }
    let product = rd.vec(60)?;
    let layout = rd.array::<4>()?;
    rd.endian = match (i32::from_le_bytes(layout), i32::from_be_bytes(layout)) {
        (2 | 3, _) => Endian::Little,
        (_, 2 | 3) => Endian::Big,
        _ => bail!("unrecognised layout code {:?}", layout),
    };
    let nominal_case_size = rd.i32()?;
    let compression = rd.i32()?;
    let _weight_index = rd.i32()?;
    let ncases = rd.i32()?;
    let bias = rd.f64()?;
    let _creation = rd.vec(9 + 8)?;
    let file_label = rd.vec(64)?;
    rd.skip(3)?;

    // ─── 2) dictionary ───────────────────────────────────────────────
    let mut variables: Vec<Variable> = Vec::new();
    let mut slots = 0usize;
    let mut long_names: Option<Vec<u8>> = None;
    let mut encoding: Option<Encoding> = None;
    let mut code_page: Option<Encoding> = None;

    loop {
        let rec_type = rd.i32().context("reading dictionary record type")?;
        match rec_type {
            2 => {
                let var_type = rd.i32()?;
                let has_label = rd.i32()?;
                let n_missing = rd.i32()?;
                let _print = rd.i32()?;
                let _write = rd.i32()?;
                let name = rd.array::<8>()?;
                if has_label == 1 {
                    let len = rd.i32()?.max(0) as usize;
                    rd.skip((len + 3) / 4 * 4)?;
                }
                let missing = match n_missing {
                    0 => MissingSpec::None,
                    1..=3 => MissingSpec::Discrete(
                        (0..n_missing)
                            .map(|_| rd.array::<8>())
                            .collect::<Result<_>>()?,
                    ),
                    -2 => MissingSpec::Range {
                        lo: rd.array::<8>()?,
                        hi: rd.array::<8>()?,
                        extra: None,
                    },
                    -3 => MissingSpec::Range {
                        lo: rd.array::<8>()?,
                        hi: rd.array::<8>()?,
                        extra: Some(rd.array::<8>()?),
                    },
                    n => bail!("invalid missing value count {}", n),
                };
                if var_type == -1 {
                    // continuation of a long string
                    slots += 1;
                    continue;
                }
                if !(0..=255).contains(&var_type) {
                    bail!("invalid variable type {}", var_type);
                }
                variables.push(Variable {
                    short_name: trim_name(&name).to_vec(),
                    width: var_type as usize,
                    slot: slots,
                    missing,
                });
                slots += 1;
            }
            3 => {
                let count = rd.i32()?.max(0);
                for _ in 0..count {
                    rd.skip(8)?;
                    let len = rd.array::<1>()?[0] as usize;
                    rd.skip((len + 1 + 7) / 8 * 8 - 1)?;
                }
                let next = rd.i32()?;
                if next != 4 {
                    bail!("value label record not followed by variable index record");
                }
                let n = rd.i32()?.max(0) as usize;
                rd.skip(n * 4)?;
            }
            6 => {
                let lines = rd.i32()?.max(0) as usize;
                rd.skip(lines * 80)?;
            }
            7 => {
                let subtype = rd.i32()?;
                let size = rd.i32()?.max(0) as usize;
                let count = rd.i32()?.max(0) as usize;
                let data = rd.vec(size * count)?;
                match subtype {
                    3 if size == 4 && count >= 8 => {
                        let b = [data[28], data[29], data[30], data[31]];
                        code_page = Encoding::from_code_page(decode_i32(b, rd.endian));
                    }
                    13 => long_names = Some(data),
                    20 => encoding = Some(Encoding::from_name(&String::from_utf8_lossy(&data))),
                    _ => debug!(subtype, "skipping extension record"),
                }
            }
            999 => {
                let _filler = rd.i32()?;
                break;
            }
            other => bail!("unexpected dictionary record type {}", other),
        }
    }

    // every variable must fit inside the declared case
    for var in &variables {
        let end = var.slot + var.slots();
        if end > slots || (nominal_case_size >= 0 && end > nominal_case_size as usize) {
            bail!(
                "variable {} spans slots {}..{} but the case has {} (header says {})",
                String::from_utf8_lossy(&var.short_name),
                var.slot,
                end,
                slots,
                nominal_case_size
            );
        }
    }

    let encoding = encoding.or(code_page).unwrap_or(Encoding::Utf8);
    let header = SavHeader {
        product: encoding.decode(trim_name(&product)),
        compression,
        nominal_case_size,
        ncases,
        bias,
        file_label: encoding.decode(trim_name(&file_label)),
    };
    debug!(?header, variables = variables.len(), slots, "parsed dictionary");

    // ─── 3) resolve names and projection ─────────────────────────────
    let mut renames: HashMap<String, String> = HashMap::new();
    if let Some(raw) = long_names {
        for pair in encoding.decode(&raw).split('\t') {
            if let Some((short, long)) = pair.split_once('=') {
                renames.insert(short.trim().to_string(), long.trim().to_string());
            }
        }
    }
    let names: Vec<String> = variables
        .iter()
        .map(|v| {
            let short = encoding.decode(&v.short_name);
            renames.get(&short).cloned().unwrap_or(short)
        })
        .collect();

    let selected: Vec<usize> = match usecols {
        None => (0..variables.len()).collect(),
        Some(cols) => {
            let by_name: HashMap<&str, usize> = names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.as_str(), i))
                .collect();
            let missing: Vec<&str> = cols
                .iter()
                .copied()
                .filter(|c| !by_name.contains_key(c))
                .collect();
            if !missing.is_empty() {
                bail!("columns not found in system file: {}", missing.join(", "));
            }
            cols.iter().map(|c| by_name[c]).collect()
        }
    };

    // ─── 4) case data ────────────────────────────────────────────────
    let layout = CaseLayout {
        variables: &variables,
        selected: &selected,
        slots,
        ncases,
        encoding,
        endian: rd.endian,
    };
    let builders = match compression {
        0 => layout.read(RawSlots { reader: rd })?,
        1 => layout.read(BytecodeSlots::new(rd, bias))?,
        2 => bail!("zlib case compression is not supported"),
        c => bail!("unknown compression code {}", c),
    };

    let mut table = SurveyTable::new();
    for (b, &i) in builders.into_iter().zip(&selected) {
        let col = match b {
            Builder::Numeric(v) => Column::Numeric(v),
            Builder::Text(v) => Column::Text(v),
        };
        table.push_column(names[i].clone(), col)?;
    }
    Ok(table)
}

struct CaseLayout<'a> {
    variables: &'a [Variable],
    selected: &'a [usize],
    slots: usize,
    ncases: i32,
    encoding: Encoding,
    endian: Endian,
}

impl CaseLayout<'_> {
    fn read<S: SlotSource>(&self, mut source: S) -> Result<Vec<Builder>> {
        let mut builders: Vec<Builder> = self
            .selected
            .iter()
            .map(|&i| {
                if self.variables[i].width == 0 {
                    Builder::Numeric(Vec::new())
                } else {
                    Builder::Text(Vec::new())
                }
            })
            .collect();

        let mut case = vec![[0u8; 8]; self.slots];
        let mut read = 0i64;
        while self.ncases < 0 || read < self.ncases as i64 {
            match source.next_slot()? {
                Some(first) if self.slots > 0 => case[0] = first,
                _ => break,
            }
            for (k, slot) in case.iter_mut().enumerate().skip(1) {
                *slot = source
                    .next_slot()?
                    .ok_or_else(|| anyhow!("case {} truncated at slot {}", read, k))?;
            }
            for (b, &i) in builders.iter_mut().zip(self.selected) {
                let var = &self.variables[i];
                match b {
                    Builder::Numeric(v) => v.push(numeric_value(case[var.slot], var, self.endian)),
                    Builder::Text(v) => v.push(text_value(&case, var, self.encoding)),
                }
            }
            read += 1;
        }
        if self.ncases >= 0 && read < self.ncases as i64 {
            bail!("file declares {} cases but only {} were read", self.ncases, read);
        }
        debug!(cases = read, columns = self.selected.len(), "read case data");
        Ok(builders)
    }
}

fn numeric_value(slot: [u8; 8], var: &Variable, endian: Endian) -> Option<f64> {
    let v = decode_f64(slot, endian);
    if v == SYSMIS || v.is_nan() {
        return None;
    }
    let is_missing = match &var.missing {
        MissingSpec::None => false,
        MissingSpec::Discrete(vals) => vals.iter().any(|m| decode_f64(*m, endian) == v),
        MissingSpec::Range { lo, hi, extra } => {
            let (lo, hi) = (decode_f64(*lo, endian), decode_f64(*hi, endian));
            (lo..=hi).contains(&v) || extra.is_some_and(|e| decode_f64(e, endian) == v)
        }
    };
    (!is_missing).then_some(v)
}

fn text_value(case: &[[u8; 8]], var: &Variable, encoding: Encoding) -> String {
    let mut bytes: Vec<u8> = case[var.slot..var.slot + var.slots()]
        .iter()
        .flatten()
        .copied()
        .collect();
    bytes.truncate(var.width);
    let s = encoding.decode(&bytes).trim_end().to_string();
    if let MissingSpec::Discrete(vals) = &var.missing {
        if vals.iter().any(|m| encoding.decode(m).trim_end() == s) {
            return String::new();
        }
    }
    s
}
