//! Upload-to-artifacts pipeline shared by the HTTP handlers and headless mode

use std::path::Path;

use crate::error::{AppError, AppResult};
use crate::metadata::{extract_metadata_async, MetadataRecord};
use crate::pdf_processor::extract_text_async;
use crate::settings::AppSettings;
use crate::speech::{synthesize_to_file, SpeechSynthesizer};
use crate::summary::{extract_keywords, summarize, KeywordEntry};

#[derive(Debug, Clone)]
pub struct DocumentAnalysis {
    pub full_text: String,
    pub summary: String,
    pub keywords: Vec<KeywordEntry>,
}

impl DocumentAnalysis {
    pub fn from_text(full_text: String, settings: &AppSettings) -> Self {
        let summary = summarize(&full_text, settings.summary_chars);
        let keywords = extract_keywords(
            &full_text,
            settings.keyword_count,
            settings.min_keyword_len,
        );
        Self {
            full_text,
            summary,
            keywords,
        }
    }
}

/// Extract text and derive summary and keywords.
pub async fn analyze_text(bytes: Vec<u8>, settings: &AppSettings) -> AppResult<DocumentAnalysis> {
    let text = extract_text_async(bytes).await?;
    Ok(DocumentAnalysis::from_text(text, settings))
}

/// Metadata and text are extracted independently; a metadata failure does
/// not affect the text result.
pub async fn analyze_all(
    bytes: Vec<u8>,
    settings: &AppSettings,
) -> (AppResult<MetadataRecord>, AppResult<DocumentAnalysis>) {
    tokio::join!(
        extract_metadata_async(bytes.clone()),
        analyze_text(bytes, settings)
    )
}

/// Headless mode: analyze a PDF on disk and print a report to stdout.
pub async fn analyze_headless(
    path: &Path,
    settings: &AppSettings,
    speech: Option<(&dyn SpeechSynthesizer, &Path)>,
) -> AppResult<()> {
    let bytes = tokio::fs::read(path).await?;
    println!("Analyzing: {}", path.display());

    let (metadata, analysis) = analyze_all(bytes, settings).await;
    let analysis = analysis?;

    println!("\n== Metadata ==");
    match metadata {
        Ok(record) => print!("{}", format_metadata(&record)),
        Err(AppError::ExtractionEmpty) => println!("{}", AppError::ExtractionEmpty),
        Err(e) => println!("Metadata unavailable: {}", e),
    }

    println!("\n== Summary ==\n{}", analysis.summary);

    println!("\n== Keywords ==");
    if analysis.keywords.is_empty() {
        println!("(none)");
    }
    for entry in &analysis.keywords {
        println!("{:>5}  {}", entry.count, entry.word);
    }

    if let Some((synthesizer, out)) = speech {
        match synthesize_to_file(synthesizer, &analysis.summary, &settings.speech_lang, out).await
        {
            Ok(()) => println!("\nAudio written to {}", out.display()),
            Err(e) => {
                log::warn!("{}", e);
                println!("\nSpeech synthesis unavailable: {}", e);
            }
        }
    }

    Ok(())
}

fn format_metadata(record: &MetadataRecord) -> String {
    let rows = [
        ("Title", &record.title),
        ("Authors", &record.authors),
        ("Year", &record.year),
        ("Journal", &record.journal),
        ("Keywords", &record.keywords),
    ];
    rows.iter()
        .map(|(label, value)| format!("{:<9} {}\n", format!("{}:", label), value))
        .collect()
}
