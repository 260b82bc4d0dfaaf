//! Shared fixtures for the integration tests: a deterministic embedder,
//! a scripted generator, an engine over a temp directory, and OOXML
//! builders.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use ragdrop::config::Config;
use ragdrop::embedding::Embedder;
use ragdrop::engine::Engine;
use ragdrop::extract::DocumentExtractor;
use ragdrop::generate::{Generation, Generator};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const DIMS: usize = 64;

/// Bag-of-words embedder: identical texts map to identical vectors.
/// Texts containing `POISON` fail.
pub struct WordEmbedder;

#[async_trait]
impl Embedder for WordEmbedder {
    fn model_name(&self) -> &str {
        "word-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("POISON") {
            bail!("embedding backend unavailable");
        }
        let mut v = vec![0.0f32; DIMS];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(131).wrapping_add(b as usize));
            v[bucket % DIMS] += 1.0;
        }
        Ok(v)
    }
}

/// Answers with a fixed string and remembers every prompt it saw.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, history: Option<Vec<i64>>) -> Result<Generation> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut context = history.unwrap_or_default();
        context.push(1);
        Ok(Generation {
            text: "scripted answer".to_string(),
            context: Some(context),
        })
    }
}

pub fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::minimal(tmp.path());
    config.watch.debounce_ms = 100;
    config.watch.stability_interval_ms = 50;
    config.server.bind = "127.0.0.1:0".to_string();
    config
}

pub fn open_engine(config: Config, generator: Arc<ScriptedGenerator>) -> Arc<Engine> {
    Arc::new(
        Engine::open(
            config,
            Arc::new(DocumentExtractor),
            Arc::new(WordEmbedder),
            generator,
        )
        .unwrap(),
    )
}

pub fn zip_entries(entries: &[(String, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(name.as_str(), zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

/// Minimal .docx with one `<w:p>` per paragraph.
pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    zip_entries(&[(
        "word/document.xml".to_string(),
        format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        ),
    )])
}

/// Minimal .pptx; each slide holds one shape per entry.
pub fn pptx(slides: &[&[&str]]) -> Vec<u8> {
    let entries: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .map(|(i, shapes)| {
            let sps: String = shapes
                .iter()
                .map(|t| {
                    format!(
                        "<p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>",
                        t
                    )
                })
                .collect();
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    "<?xml version=\"1.0\"?><p:sld xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\" xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>",
                    sps
                ),
            )
        })
        .collect();
    zip_entries(&entries)
}
