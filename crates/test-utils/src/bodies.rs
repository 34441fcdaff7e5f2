use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use anyhow::Context;
use kbflow::model::Model;
use kbflow::processor::{ProcessorBody, ProcessorInput};
use oxrdf::{Literal, NamedNode, Triple};

/// The single statement a [`SpyBody`] named `name` produces.
pub fn marker(name: &str) -> Triple {
    Triple::new(
        NamedNode::new_unchecked(format!("urn:test:{name}")),
        NamedNode::new_unchecked("urn:test:producedBy"),
        Literal::new_simple_literal(name),
    )
}

/// Model containing only the marker of `name`.
pub fn marker_model(name: &str) -> Model {
    Model::from_triples([marker(name)])
}

/// Counts `compute` calls, remembers the last input, and either returns
/// its marker statement or fails with an I/O error.
#[derive(Debug)]
pub struct SpyBody {
    name: String,
    fail: bool,
    calls: AtomicUsize,
    last_input: Mutex<Option<ProcessorInput>>,
}

impl SpyBody {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<ProcessorInput> {
        self.last_input.lock().unwrap().clone()
    }
}

impl ProcessorBody for SpyBody {
    fn compute(&self, input: &ProcessorInput) -> anyhow::Result<Model> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(input.clone());
        if self.fail {
            let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
            return Err(err).with_context(|| format!("loading data for {}", self.name));
        }
        Ok(marker_model(&self.name))
    }
}

/// Blocks inside `compute` until the test opens the gate.
#[derive(Debug)]
pub struct GatedBody {
    name: String,
    entered: AtomicBool,
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedBody {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entered: AtomicBool::new(false),
            open: Mutex::new(false),
            opened: Condvar::new(),
        }
    }

    /// Whether `compute` has been entered.
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl ProcessorBody for GatedBody {
    fn compute(&self, _input: &ProcessorInput) -> anyhow::Result<Model> {
        self.entered.store(true, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        Ok(marker_model(&self.name))
    }
}
