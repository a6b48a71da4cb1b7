//! Configuration parsing for the synthetic engine.
//!
//! [`parse_document`] answers the way the native parser does: either the
//! normalised document or a flat `{key, msg, code, parameter}` error object.

use serde_json::{json, Map};
use std::collections::BTreeSet;

use sqs_types::{
    normalize_modes, Configuration, IterationMode, ParseError, ParseErrorCode, Precision,
    RunConfig, SublatticeMode, KEY_ITERATIONS, KEY_ITERATION_MODE, KEY_PRECISION, KEY_SUBLATTICE_MODE,
};

pub const KEY_STRUCTURE: &str = "structure";
pub const KEY_COMPOSITION: &str = "composition";
pub const KEY_SITES: &str = "sites";

/// Largest structure, supercell included, the engine accepts.
pub const MAX_SITES: usize = 1 << 20;

/// Sites of the structure and the species distributed over them.
#[derive(Debug, Clone, PartialEq)]
pub struct Sublattice {
    pub sites: Vec<usize>,
    /// Species name and atom count. Zero counts are dropped.
    pub species: Vec<(String, u64)>,
}

impl Sublattice {
    /// Species indices in ascending order, one per site.
    pub fn initial_arrangement(&self) -> Vec<usize> {
        self.species
            .iter()
            .enumerate()
            .flat_map(|(index, (_, count))| std::iter::repeat(index).take(*count as usize))
            .collect()
    }

    /// Number of distinct arrangements, saturating at `cap`.
    pub fn arrangements(&self, cap: u64) -> u64 {
        let cap = u128::from(cap);
        let mut remaining = self.sites.len() as u128;
        let mut total: u128 = 1;

        for (_, count) in &self.species {
            let count = u128::from(*count);
            let k = count.min(remaining.saturating_sub(count));
            let mut binomial: u128 = 1;
            for j in 0..k {
                binomial = binomial * (remaining - j) / (j + 1);
                if binomial > cap {
                    return cap as u64;
                }
            }
            total = total.saturating_mul(binomial);
            if total > cap {
                return cap as u64;
            }
            remaining = remaining.saturating_sub(count);
        }
        total as u64
    }

    fn to_value(&self) -> Configuration {
        let mut entry = Map::new();
        entry.insert(KEY_SITES.to_string(), json!(self.sites));
        for (name, count) in &self.species {
            entry.insert(name.clone(), json!(count));
        }
        Configuration::Object(entry)
    }
}

/// A configuration the synthetic engine can search.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Species of every site, supercell included.
    pub species: Vec<String>,
    pub sublattices: Vec<Sublattice>,
    pub run: RunConfig,
}

/// Parse `raw` into the engine's answer: the normalised document on
/// success, an error-shaped object otherwise.
pub fn parse_document(raw: &Configuration) -> Configuration {
    match read_model(raw) {
        Ok(model) => model.run.document,
        Err(error) => error_object(&error),
    }
}

pub fn error_object(error: &ParseError) -> Configuration {
    json!({
        "key": error.key,
        "msg": error.msg,
        "code": error.code.code(),
        "parameter": error.parameter,
    })
}

pub fn read_model(raw: &Configuration) -> Result<Model, ParseError> {
    let mut document = normalize_modes(raw)?;
    let fields = document.as_object_mut().ok_or_else(|| {
        ParseError::new(
            "",
            "The configuration must be a JSON object",
            ParseErrorCode::BadValue,
        )
    })?;

    let species = read_structure(fields.get(KEY_STRUCTURE))?;
    let sublattices = read_composition(fields.get(KEY_COMPOSITION), &species)?;

    fields
        .entry(KEY_PRECISION)
        .or_insert_with(|| json!(Precision::default().as_str()));
    fields
        .entry(KEY_SUBLATTICE_MODE)
        .or_insert_with(|| json!(SublatticeMode::default().as_str()));
    fields
        .entry(KEY_ITERATION_MODE)
        .or_insert_with(|| json!(IterationMode::default().as_str()));
    fields.insert(
        KEY_COMPOSITION.to_string(),
        Configuration::Array(sublattices.iter().map(Sublattice::to_value).collect()),
    );

    let mut run = RunConfig::from_document(document)?;
    if let (Some(iterations), Some(fields)) = (run.iterations, run.document.as_object_mut()) {
        fields.insert(KEY_ITERATIONS.to_string(), json!(iterations));
    }

    if run.sublattice_mode == SublatticeMode::Split && sublattices.len() < 2 {
        return Err(ParseError::new(
            KEY_SUBLATTICE_MODE,
            "sublattice_mode 'split' needs at least two sublattices",
            ParseErrorCode::BadValue,
        )
        .with_parameter(KEY_SUBLATTICE_MODE));
    }
    if run.iteration_mode == IterationMode::Systematic && sublattices.len() > 1 {
        return Err(ParseError::new(
            KEY_ITERATION_MODE,
            "Systematic iteration supports a single sublattice only",
            ParseErrorCode::BadArgument,
        )
        .with_parameter(KEY_ITERATION_MODE));
    }

    Ok(Model {
        species,
        sublattices,
        run,
    })
}

fn missing(key: &str, parameter: &str) -> ParseError {
    ParseError::new(
        key,
        format!("Missing required field \"{key}\""),
        ParseErrorCode::NotFound,
    )
    .with_parameter(parameter)
}

fn wrong_type(key: &str, expected: &str, parameter: &str) -> ParseError {
    ParseError::new(
        key,
        format!("\"{key}\" must be {expected}"),
        ParseErrorCode::TypeError,
    )
    .with_parameter(parameter)
}

fn array_field<'a>(
    fields: &'a Map<String, Configuration>,
    key: &str,
) -> Result<&'a Vec<Configuration>, ParseError> {
    fields
        .get(key)
        .ok_or_else(|| missing(key, KEY_STRUCTURE))?
        .as_array()
        .ok_or_else(|| wrong_type(key, "an array", KEY_STRUCTURE))
}

fn read_structure(value: Option<&Configuration>) -> Result<Vec<String>, ParseError> {
    let structure = value
        .ok_or_else(|| missing(KEY_STRUCTURE, KEY_STRUCTURE))?
        .as_object()
        .ok_or_else(|| wrong_type(KEY_STRUCTURE, "an object", KEY_STRUCTURE))?;

    let lattice = array_field(structure, "lattice")?;
    let is_row = |row: &Configuration| {
        row.as_array()
            .map(|row| row.len() == 3 && row.iter().all(Configuration::is_number))
            .unwrap_or(false)
    };
    if lattice.len() != 3 || !lattice.iter().all(is_row) {
        return Err(ParseError::new(
            "lattice",
            "The lattice must be a 3x3 matrix of numbers",
            ParseErrorCode::BadValue,
        )
        .with_parameter(KEY_STRUCTURE));
    }

    let coords = array_field(structure, "coords")?;
    let species = array_field(structure, "species")?;
    if species.is_empty() {
        return Err(ParseError::new(
            "species",
            "The structure does not contain any sites",
            ParseErrorCode::OutOfRange,
        )
        .with_parameter(KEY_STRUCTURE));
    }
    if coords.len() != species.len() {
        return Err(ParseError::new(
            "coords",
            format!(
                "Got {} coordinates but {} species",
                coords.len(),
                species.len()
            ),
            ParseErrorCode::BadValue,
        )
        .with_parameter(KEY_STRUCTURE));
    }

    let names = species
        .iter()
        .map(|specie| match specie {
            Configuration::String(name) => Ok(name.clone()),
            Configuration::Number(n) if n.is_u64() => Ok(n.to_string()),
            _ => Err(wrong_type(
                "species",
                "a list of element symbols or atomic numbers",
                KEY_STRUCTURE,
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let cells = supercell_size(structure.get("supercell"))?;
    let sites = names
        .len()
        .checked_mul(cells)
        .filter(|sites| *sites <= MAX_SITES)
        .ok_or_else(|| {
            ParseError::new(
                "supercell",
                format!("The supercell would contain more than {MAX_SITES} sites"),
                ParseErrorCode::OutOfRange,
            )
            .with_parameter(KEY_STRUCTURE)
        })?;
    Ok(names.into_iter().cycle().take(sites).collect())
}

fn supercell_size(value: Option<&Configuration>) -> Result<usize, ParseError> {
    let Some(value) = value else {
        return Ok(1);
    };
    let invalid = || {
        ParseError::new(
            "supercell",
            format!("The supercell must be three positive integers, got {value}"),
            ParseErrorCode::BadValue,
        )
        .with_parameter(KEY_STRUCTURE)
    };

    let shape = value.as_array().ok_or_else(invalid)?;
    if shape.len() != 3 {
        return Err(invalid());
    }
    shape.iter().try_fold(1usize, |cells, axis| {
        axis.as_u64()
            .filter(|n| *n >= 1)
            .and_then(|n| usize::try_from(n).ok())
            .and_then(|n| cells.checked_mul(n))
            .ok_or_else(invalid)
    })
}

fn read_composition(
    value: Option<&Configuration>,
    species: &[String],
) -> Result<Vec<Sublattice>, ParseError> {
    const EXPECTED: &str = "an object or an array of objects";

    let value = value.ok_or_else(|| missing(KEY_COMPOSITION, KEY_COMPOSITION))?;
    let entries: Vec<&Map<String, Configuration>> = match value {
        Configuration::Object(entry) => vec![entry],
        Configuration::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| wrong_type(KEY_COMPOSITION, EXPECTED, KEY_COMPOSITION))
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(wrong_type(KEY_COMPOSITION, EXPECTED, KEY_COMPOSITION)),
    };
    if entries.is_empty() {
        return Err(ParseError::new(
            KEY_COMPOSITION,
            "The composition must contain at least one sublattice",
            ParseErrorCode::OutOfRange,
        )
        .with_parameter(KEY_COMPOSITION));
    }

    let mut taken = BTreeSet::new();
    let mut sublattices = Vec::with_capacity(entries.len());
    for entry in entries {
        let sites = resolve_sites(entry.get(KEY_SITES), species)?;
        for &site in &sites {
            if !taken.insert(site) {
                return Err(ParseError::new(
                    KEY_SITES,
                    format!("The site with index {site} is contained in more than one sublattice"),
                    ParseErrorCode::BadValue,
                )
                .with_parameter(KEY_COMPOSITION));
            }
        }

        let mut counts = Vec::new();
        for (name, count) in entry.iter().filter(|(key, _)| key.as_str() != KEY_SITES) {
            let count = count.as_u64().ok_or_else(|| {
                ParseError::new(
                    KEY_COMPOSITION,
                    format!("The number of {name} atoms must be a non-negative integer, got {count}"),
                    ParseErrorCode::TypeError,
                )
                .with_parameter(KEY_COMPOSITION)
            })?;
            if count > 0 {
                counts.push((name.clone(), count));
            }
        }
        if counts.is_empty() {
            return Err(ParseError::new(
                KEY_SITES,
                "There are no remaining species left for the sublattice",
                ParseErrorCode::OutOfRange,
            )
            .with_parameter(KEY_COMPOSITION));
        }

        let atoms = counts
            .iter()
            .try_fold(0u64, |atoms, (_, count)| atoms.checked_add(*count));
        if atoms != Some(sites.len() as u64) {
            let atoms = atoms.map_or_else(|| format!("more than {}", u64::MAX), |a| a.to_string());
            return Err(ParseError::new(
                KEY_SITES,
                format!(
                    "The sublattice has {} sites but the composition distributes {atoms} atoms",
                    sites.len()
                ),
                ParseErrorCode::OutOfRange,
            )
            .with_parameter(KEY_COMPOSITION));
        }

        sublattices.push(Sublattice {
            sites,
            species: counts,
        });
    }
    Ok(sublattices)
}

/// Sites selected by a sublattice: all of them, those of one species, or
/// an explicit index list.
fn resolve_sites(value: Option<&Configuration>, species: &[String]) -> Result<Vec<usize>, ParseError> {
    match value {
        None => Ok((0..species.len()).collect()),
        Some(Configuration::String(name)) => {
            let sites: Vec<usize> = species
                .iter()
                .enumerate()
                .filter(|(_, specie)| *specie == name)
                .map(|(index, _)| index)
                .collect();
            if sites.is_empty() {
                return Err(ParseError::new(
                    KEY_SITES,
                    format!("The structure does not contain any {name} sites"),
                    ParseErrorCode::BadValue,
                )
                .with_parameter(KEY_COMPOSITION));
            }
            Ok(sites)
        }
        Some(Configuration::Array(indices)) => indices
            .iter()
            .map(|index| {
                index
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .filter(|i| *i < species.len())
                    .ok_or_else(|| {
                        ParseError::new(
                            KEY_SITES,
                            format!(
                                "Site index {index} is out of range for a structure with {} sites",
                                species.len()
                            ),
                            ParseErrorCode::OutOfRange,
                        )
                        .with_parameter(KEY_COMPOSITION)
                    })
            })
            .collect(),
        Some(_) => Err(wrong_type(
            KEY_SITES,
            "a species symbol or a list of site indices",
            KEY_COMPOSITION,
        )),
    }
}
