// src/processor/builtin/source.rs

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::Context;
use flate2::read::GzDecoder;
use serde::Deserialize;

use crate::model::Model;
use crate::processor::{ProcessorBody, ProcessorInput};

#[derive(Debug, Clone, Deserialize)]
pub struct NTriplesFileParams {
    pub path: PathBuf,
}

/// Loads a dataset from an N-Triples file (`.nt`, or gzipped `.nt.gz`).
#[derive(Debug)]
pub struct NTriplesFile {
    path: PathBuf,
}

impl NTriplesFile {
    pub const NAME: &'static str = "ntriples-file";

    pub fn new(params: NTriplesFileParams) -> Self {
        Self { path: params.path }
    }
}

impl ProcessorBody for NTriplesFile {
    fn compute(&self, _input: &ProcessorInput) -> anyhow::Result<Model> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening dataset file {}", self.path.display()))?;

        let mut bytes = Vec::new();
        let gzipped = self.path.extension().is_some_and(|ext| ext == "gz");
        if gzipped {
            GzDecoder::new(file).read_to_end(&mut bytes)
        } else {
            BufReader::new(file).read_to_end(&mut bytes)
        }
        .with_context(|| format!("reading dataset file {}", self.path.display()))?;

        Model::parse_ntriples(&bytes)
            .with_context(|| format!("parsing dataset file {}", self.path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NTriplesInlineParams {
    pub data: String,
}

/// A dataset given verbatim as N-Triples text in the step parameters.
///
/// The text is parsed when the step is instantiated, so malformed data is
/// reported as an instantiation error.
#[derive(Debug)]
pub struct NTriplesInline {
    model: Model,
}

impl NTriplesInline {
    pub const NAME: &'static str = "ntriples-inline";

    pub fn new(params: NTriplesInlineParams) -> anyhow::Result<Self> {
        let model = Model::parse_ntriples(params.data.as_bytes())?;
        Ok(Self { model })
    }
}

impl ProcessorBody for NTriplesInline {
    fn compute(&self, _input: &ProcessorInput) -> anyhow::Result<Model> {
        Ok(self.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    const DATA: &str = "<urn:a> <urn:label> \"alpha\" .\n<urn:b> <urn:label> \"beta\" .\n";

    #[test]
    fn reads_plain_and_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("d.nt");
        std::fs::write(&plain, DATA).unwrap();

        let gz = dir.path().join("d.nt.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(DATA.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let input = ProcessorInput::default();
        let from_plain = NTriplesFile::new(NTriplesFileParams { path: plain }).compute(&input).unwrap();
        let from_gz = NTriplesFile::new(NTriplesFileParams { path: gz }).compute(&input).unwrap();
        assert_eq!(from_plain.len(), 2);
        assert_eq!(from_plain, from_gz);
    }

    #[test]
    fn missing_file_reports_the_path() {
        let body = NTriplesFile::new(NTriplesFileParams {
            path: PathBuf::from("/definitely/not/here.nt"),
        });
        let err = body.compute(&ProcessorInput::default()).unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.nt"));
    }

    #[test]
    fn inline_data_is_parsed_up_front() {
        assert!(NTriplesInline::new(NTriplesInlineParams { data: DATA.to_string() }).is_ok());
        assert!(NTriplesInline::new(NTriplesInlineParams { data: "nonsense".to_string() }).is_err());
    }
}
