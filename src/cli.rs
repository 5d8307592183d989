//! The batch front door: parse headers into a database file, merge
//! database files, and dump one for inspection.
//!
//! Batch semantics: each input file parses independently; a fatal failure
//! in one file is counted and reported but does not stop the run. The
//! process exits non-zero only if any fatal failure occurred — warnings
//! alone never fail a run.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use scry_core::{Database, ModuleDef, SearchPath};
use scry_cpp::{build_database, library_hash_name, BuildOptions, Parser, PreprocessorConfig};

use crate::error::ScryError;

/// Options for `scry parse`.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub files: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
    pub module_name: String,
    pub library_name: String,
    pub output: Option<PathBuf>,
    pub permissive: bool,
    pub json: bool,
}

/// What a batch run did, for the final report.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub files_parsed: usize,
    pub files_failed: usize,
    pub warnings: usize,
    pub types: usize,
    pub functions: usize,
    pub manifests: usize,
    pub elements: usize,
}

impl BatchReport {
    /// True when the run should exit non-zero.
    pub fn failed(&self) -> bool {
        self.files_failed > 0
    }

    pub fn render(&self, json: bool, out: &mut dyn Write) -> std::io::Result<()> {
        if json {
            let text = serde_json::to_string_pretty(self).unwrap_or_default();
            writeln!(out, "{}", text)
        } else {
            writeln!(
                out,
                "{} file(s) parsed, {} warning(s), {} fatal failure(s)",
                self.files_parsed, self.warnings, self.files_failed
            )?;
            writeln!(
                out,
                "{} type(s), {} function(s), {} manifest(s), {} element(s)",
                self.types, self.functions, self.manifests, self.elements
            )
        }
    }
}

/// Parse a batch of headers and write the resulting database.
pub fn run_parse(options: &ParseOptions, out: &mut dyn Write) -> Result<BatchReport, ScryError> {
    if options.files.is_empty() {
        return Err(ScryError::InvalidArguments(
            "no input files given".to_string(),
        ));
    }

    let mut search_path = SearchPath::new();
    for dir in &options.include_dirs {
        search_path.append_directory(dir);
    }
    let config = PreprocessorConfig {
        search_path,
        permissive_includes: options.permissive,
    };

    let mut parser = Parser::new(config);
    let mut report = BatchReport::default();

    for file in &options.files {
        match parser.parse_file(file) {
            Ok(()) => {
                report.files_parsed += 1;
            }
            Err(err) => {
                // Declarations parsed before the failure are kept; the
                // rest of the batch still runs.
                error!("{}: {}", file.display(), err);
                report.files_failed += 1;
            }
        }
    }
    parser.resolve_types();

    let warnings = parser.take_warnings();
    for warning in &warnings {
        info!("{}", warning);
    }
    report.warnings = warnings.len();

    let mut db = Database::new();
    let stats = build_database(
        &parser,
        &mut db,
        &BuildOptions {
            library_name: options.library_name.clone(),
            module_name: options.module_name.clone(),
        },
    )?;
    report.types = stats.types;
    report.functions = stats.functions;
    report.manifests = stats.manifests;
    report.elements = stats.elements;

    db.remap_indices(1);

    if let Some(output) = &options.output {
        let def = module_def_for(&options.library_name, &options.module_name);
        db.write_file(output, &def)?;
        info!(file = %output.display(), "wrote database");
    }

    report.render(options.json, out).map_err(|source| ScryError::Io {
        file: "<stdout>".to_string(),
        source,
    })?;
    Ok(report)
}

/// Merge database files into one, unifying types by true name.
pub fn run_merge(
    inputs: &[PathBuf],
    output: &Path,
    out: &mut dyn Write,
) -> Result<(), ScryError> {
    if inputs.is_empty() {
        return Err(ScryError::InvalidArguments(
            "no input databases given".to_string(),
        ));
    }

    let mut db = Database::new();
    let mut merged_def = ModuleDef::default();
    for input in inputs {
        // Stage each file in a scratch database, then remap it onto the
        // merged database's free range. A bad file aborts before anything
        // is half-committed.
        let mut incoming = Database::new();
        let mut def = ModuleDef::default();
        incoming.read_file(input, &mut def)?;
        incoming.remap_indices(db.next_index());
        db.merge_from(incoming)?;
        if merged_def.library_name.is_empty() {
            merged_def = def;
        }
    }

    db.write_file(output, &merged_def)?;
    writeln!(out, "merged {} database(s) into {}", inputs.len(), output.display()).map_err(
        |source| ScryError::Io {
            file: "<stdout>".to_string(),
            source,
        },
    )?;
    Ok(())
}

/// Print a readable listing of a database file.
pub fn run_show(input: &Path, out: &mut dyn Write) -> Result<(), ScryError> {
    let mut db = Database::new();
    let mut def = ModuleDef::default();
    db.read_file(input, &mut def)?;

    render_database(&mut db, &def, out).map_err(|source| ScryError::Io {
        file: "<stdout>".to_string(),
        source,
    })?;
    Ok(())
}

fn render_database(
    db: &mut Database,
    def: &ModuleDef,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    writeln!(
        out,
        "library {:?} hash {:?} module {:?} (file version {}.{})",
        def.library_name,
        def.library_hash_name,
        def.module_name,
        db.get_file_major_version(),
        db.get_file_minor_version()
    )?;

    writeln!(out, "\nfunctions:")?;
    let functions: Vec<_> = db.functions().map(|(i, f)| (i, f.clone())).collect();
    for (index, function) in functions {
        writeln!(
            out,
            "  {} {} ({} wrapper(s))",
            index,
            function.scoped_name,
            function.wrappers.len()
        )?;
        for wrapper_index in &function.wrappers {
            let wrapper = db.get_wrapper(*wrapper_index).clone();
            let params: Vec<String> = wrapper
                .parameters
                .iter()
                .map(|p| {
                    let ty = db.get_type(p.param_type).name.clone();
                    if p.is_this() {
                        format!("this: {}", ty)
                    } else if p.has_name() {
                        format!("{}: {}", p.name, ty)
                    } else {
                        ty
                    }
                })
                .collect();
            let ret = if wrapper.has_return_value() {
                db.get_type(wrapper.return_type).name.clone()
            } else {
                "void".to_string()
            };
            writeln!(
                out,
                "    {} [{}] ({}) -> {}",
                wrapper_index,
                wrapper.unique_name,
                params.join(", "),
                ret
            )?;
        }
    }

    writeln!(out, "\ntypes:")?;
    let types: Vec<_> = db.types().map(|(i, t)| (i, t.clone())).collect();
    for (index, ty) in types {
        let mut notes = Vec::new();
        if ty.is_global() {
            notes.push("global");
        }
        if !ty.is_fully_defined() {
            notes.push("forward");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        writeln!(out, "  {} {}{}", index, ty.scoped_name, notes)?;
    }

    writeln!(out, "\nmanifests:")?;
    let manifests: Vec<_> = db.manifests().map(|(i, m)| (i, m.clone())).collect();
    for (index, manifest) in manifests {
        writeln!(out, "  {} {} = {}", index, manifest.name, manifest.definition)?;
    }

    writeln!(out, "\nelements:")?;
    let elements: Vec<_> = db.elements().map(|(i, e)| (i, e.clone())).collect();
    for (index, element) in elements {
        let ty = db.get_type(element.element_type).name.clone();
        writeln!(out, "  {} {}: {}", index, element.scoped_name, ty)?;
    }
    Ok(())
}

/// The module def stamped into a freshly generated database file.
fn module_def_for(library_name: &str, module_name: &str) -> ModuleDef {
    ModuleDef {
        library_name: library_name.to_string(),
        library_hash_name: library_hash_name(library_name),
        module_name: module_name.to_string(),
        file_identifier: file_identifier_for(library_name, module_name),
        ..ModuleDef::default()
    }
}

/// A stable identifier tying a database file to the build that produced
/// it.
fn file_identifier_for(library_name: &str, module_name: &str) -> u32 {
    // FNV-1a over both names; cheap and stable across runs.
    let mut hash: u32 = 0x811c9dc5;
    for byte in library_name.bytes().chain(module_name.bytes()) {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_identifier_is_stable_and_name_sensitive() {
        let a = file_identifier_for("libfoo", "foo");
        let b = file_identifier_for("libfoo", "foo");
        let c = file_identifier_for("libbar", "bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_parse_batch_is_an_argument_error() {
        let options = ParseOptions {
            files: Vec::new(),
            include_dirs: Vec::new(),
            module_name: "m".to_string(),
            library_name: "l".to_string(),
            output: None,
            permissive: false,
            json: false,
        };
        let mut sink = Vec::new();
        let err = run_parse(&options, &mut sink).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
