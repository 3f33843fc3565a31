// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Annotator backed by a long-lived child process
//!
//! Each worker starts its own child, so the child loads its model once and
//! owns its device exclusively. The worker writes one item path per line to
//! the child's stdin and reads one JSON reply per line from its stdout:
//!
//! ```text
//! {"text": "1girl, solo, smile"}
//! {"error": "cannot decode image", "unreadable": true}
//! {"error": "CUDA out of memory"}
//! ```
//!
//! A reply may echo the path it answers in an `item` field; a mismatch
//! means the child is out of step and is fatal. Lines that are not JSON
//! objects (model loading banners and the like) are logged and skipped.
//!
//! The child sees its device in `ANNOTATE_DEVICE` (`cpu` or `cuda:<n>`) and
//! `CUDA_VISIBLE_DEVICES`, and each model artifact path in
//! `ANNOTATE_MODEL_<NAME>`.

use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use super::{AnnotateError, Annotator, AnnotatorFactory, Device};
use crate::pipeline::Item;

#[derive(Debug, Clone)]
pub struct CommandAnnotatorFactory {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

/// Environment variable name for a model artifact
pub fn artifact_env_var(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("ANNOTATE_MODEL_{}", sanitized)
}

impl CommandAnnotatorFactory {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    /// Export resolved model artifacts to the child's environment
    pub fn with_artifacts(mut self, artifacts: &BTreeMap<String, PathBuf>) -> Self {
        for (name, path) in artifacts {
            self.env
                .push((artifact_env_var(name), path.display().to_string()));
        }
        self
    }
}

impl AnnotatorFactory for CommandAnnotatorFactory {
    type Annotator = CommandAnnotator;

    fn load(&self, device: Device) -> anyhow::Result<CommandAnnotator> {
        let visible = match device {
            Device::Gpu(index) => index.to_string(),
            Device::Cpu => String::new(),
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("ANNOTATE_DEVICE", device.to_string())
            .env("CUDA_VISIBLE_DEVICES", visible)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to start annotator command '{}'", self.program))?;

        let stdin = child.stdin.take().context("Annotator stdin unavailable")?;
        let stdout = child.stdout.take().context("Annotator stdout unavailable")?;
        debug!("Started annotator process {} on {}", child.id(), device);

        Ok(CommandAnnotator {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    item: Option<String>,
    text: Option<String>,
    error: Option<String>,
    #[serde(default)]
    unreadable: bool,
}

pub struct CommandAnnotator {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl Annotator for CommandAnnotator {
    fn annotate(&mut self, item: &Item) -> Result<String, AnnotateError> {
        let path = item.path().to_string_lossy();
        if path.contains('\n') {
            return Err(AnnotateError::Unreadable(
                "path contains a line break".to_string(),
            ));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AnnotateError::Fatal("annotator stdin closed".to_string()))?;
        writeln!(stdin, "{}", path)
            .and_then(|_| stdin.flush())
            .map_err(|e| AnnotateError::Fatal(format!("write to annotator failed: {}", e)))?;

        let reply = self.read_reply()?;
        if let Some(echoed) = &reply.item {
            if echoed.as_str() != path {
                return Err(AnnotateError::Fatal(format!(
                    "annotator answered for {} while {} was pending",
                    echoed, path
                )));
            }
        }

        match (reply.text, reply.error) {
            (_, Some(error)) if reply.unreadable => Err(AnnotateError::Unreadable(error)),
            (_, Some(error)) => Err(AnnotateError::Inference(error)),
            (Some(text), None) => Ok(text.trim().to_string()),
            (None, None) => Err(AnnotateError::Inference(
                "annotator reply has neither text nor error".to_string(),
            )),
        }
    }
}

impl CommandAnnotator {
    /// Next JSON reply from the child, skipping any non-JSON output
    fn read_reply(&mut self) -> Result<Reply, AnnotateError> {
        loop {
            let mut line = String::new();
            let read = self
                .stdout
                .read_line(&mut line)
                .map_err(|e| AnnotateError::Fatal(format!("read from annotator failed: {}", e)))?;
            if read == 0 {
                return Err(AnnotateError::Fatal(
                    "annotator process exited".to_string(),
                ));
            }

            let line = line.trim();
            match serde_json::from_str::<Reply>(line) {
                Ok(reply) => return Ok(reply),
                Err(_) if line.is_empty() => {}
                Err(e) => warn!("Ignoring annotator output '{}': {}", line, e),
            }
        }
    }
}

impl Drop for CommandAnnotator {
    fn drop(&mut self) {
        // EOF on stdin tells the child to exit
        self.stdin.take();
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap annotator process {}: {}", self.child.id(), e);
        }
    }
}
