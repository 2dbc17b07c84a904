//! Test doubles and fixtures for harness unit tests.
//!
//! [`RecordingBuilder`] stands in for a real compiler: it records what every
//! unit was asked to build, counts realizations and can be told to fail. Its
//! loaded units keep attached mocks in a map and hand them back on resolve,
//! which is what a real binding does from the caller's point of view.

pub mod fixtures;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::builder::{BuildUnit, Builder, LoadedUnit, RawSymbol};
use crate::builder::stubs::ExternSignature;
use crate::error::{BuildError, HarnessError, Result};

pub use fixtures::*;

/// What a unit looked like when it was realized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitRecord {
    pub name: String,
    pub source_folder: PathBuf,
    pub sources: Vec<String>,
    pub headers: Vec<String>,
    pub externs: Vec<String>,
}

#[derive(Debug, Default)]
struct Journal {
    units_created: usize,
    realize_count: usize,
    realized: Vec<UnitRecord>,
}

/// Builder double. Clones share one journal.
#[derive(Debug, Clone, Default)]
pub struct RecordingBuilder {
    journal: Arc<Mutex<Journal>>,
    failure: Option<String>,
}

impl RecordingBuilder {
    /// A builder whose units always realize.
    pub fn new() -> Self {
        RecordingBuilder::default()
    }

    /// A builder whose units always fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        RecordingBuilder {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Number of `create_unit` calls.
    pub fn units_created(&self) -> usize {
        self.journal.lock().unwrap().units_created
    }

    /// Number of `realize` calls.
    pub fn realize_count(&self) -> usize {
        self.journal.lock().unwrap().realize_count
    }

    /// The most recently realized unit.
    pub fn last_unit(&self) -> Option<UnitRecord> {
        self.journal.lock().unwrap().realized.last().cloned()
    }
}

impl Builder for RecordingBuilder {
    type Unit = RecordingUnit;

    fn create_unit(&self, name: &str) -> RecordingUnit {
        let mut journal = self.journal.lock().unwrap();
        journal.units_created += 1;
        RecordingUnit {
            id: journal.units_created,
            record: UnitRecord {
                name: name.to_string(),
                ..Default::default()
            },
            builder: self.clone(),
        }
    }
}

/// Unit produced by [`RecordingBuilder`].
#[derive(Debug)]
pub struct RecordingUnit {
    /// Sequence number of the `create_unit` call that made this unit
    pub id: usize,
    record: UnitRecord,
    builder: RecordingBuilder,
}

impl BuildUnit for RecordingUnit {
    type Loaded = FakeSut;

    fn source_folder_relative(mut self, origin_file: &Path) -> Self {
        self.record.source_folder = origin_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self
    }

    fn source_file(mut self, filename: String) -> Self {
        self.record.sources.push(filename);
        self
    }

    fn header_file(mut self, filename: String) -> Self {
        self.record.headers.push(filename);
        self
    }

    fn externs(mut self, signatures: Vec<String>) -> Self {
        self.record.externs.extend(signatures);
        self
    }

    fn realize(&self) -> std::result::Result<FakeSut, BuildError> {
        let mut journal = self.builder.journal.lock().unwrap();
        journal.realize_count += 1;
        journal.realized.push(self.record.clone());

        if let Some(message) = &self.builder.failure {
            return Err(BuildError::new(&self.record.name, message.clone()));
        }

        let names = self
            .record
            .externs
            .iter()
            .map(|declaration| {
                ExternSignature::parse(declaration)
                    .map(|signature| signature.name)
                    .map_err(|e| BuildError::new(&self.record.name, e.to_string()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(FakeSut {
            unit: self.record.name.clone(),
            externs: names,
            slots: Mutex::new(HashMap::new()),
        })
    }
}

/// Loaded unit double: slots are a map from extern name to address.
#[derive(Debug)]
pub struct FakeSut {
    unit: String,
    externs: Vec<String>,
    slots: Mutex<HashMap<String, usize>>,
}

impl FakeSut {
    /// Names of the externs the unit was built with.
    pub fn externs(&self) -> &[String] {
        &self.externs
    }

    fn not_found(&self, name: &str) -> HarnessError {
        HarnessError::BindingNotFound {
            unit: self.unit.clone(),
            name: name.to_string(),
        }
    }
}

impl LoadedUnit for FakeSut {
    fn attach(&self, name: &str, target: RawSymbol) -> Result<()> {
        if !self.externs.iter().any(|e| e == name) {
            return Err(self.not_found(name));
        }
        self.slots
            .lock()
            .unwrap()
            .insert(name.to_string(), target as usize);
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<RawSymbol> {
        self.slots
            .lock()
            .unwrap()
            .get(name)
            .map(|&address| address as RawSymbol)
            .ok_or_else(|| self.not_found(name))
    }
}
