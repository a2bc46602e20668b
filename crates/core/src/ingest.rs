use crate::chunking::{chunk_text, ChunkingConfig};
use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
use crate::models::{Chunk, ChunkMetadata};
use crate::IngestError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// PDF files directly inside `folder`, ordered by file name.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub file_name: String,
    pub checksum: String,
    pub pages_with_text: usize,
    pub chunk_count: usize,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub chunks: Vec<Chunk>,
    pub documents: Vec<SourceDocument>,
    pub skipped: Vec<SkippedPdf>,
}

impl ExtractionReport {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Chunks every page of one document. Ordinals restart at zero on each page.
pub fn chunks_for_pages(
    file_name: &str,
    pages: &[PageText],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    let mut chunks = Vec::new();

    for page in pages {
        for (ordinal, text) in chunk_text(&page.text, config)?.into_iter().enumerate() {
            chunks.push(Chunk {
                metadata: ChunkMetadata::new(file_name, page.number, ordinal, text.clone()),
                text,
            });
        }
    }

    Ok(chunks)
}

/// Extracts and chunks every PDF in `folder`. A file that fails to parse is
/// recorded in [`ExtractionReport::skipped`] and the run continues.
pub fn extract_and_chunk_with(
    folder: &Path,
    extractor: &dyn PdfExtractor,
    config: &ChunkingConfig,
) -> Result<ExtractionReport, IngestError> {
    config.validate()?;
    if !folder.is_dir() {
        return Err(IngestError::InvalidInputPath(folder.display().to_string()));
    }

    let files = discover_pdf_files(folder);
    tracing::info!(folder = %folder.display(), pdf_count = files.len(), "starting pdf extraction");

    let mut report = ExtractionReport::default();
    for path in files {
        tracing::debug!(path = %path.display(), "processing pdf");

        let file_result = (|| {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
                .to_string();
            let checksum = digest_file(&path)?;
            let pages = extractor.extract_pages(&path)?;
            let chunks = chunks_for_pages(&file_name, &pages, config)?;

            let document = SourceDocument {
                file_name,
                checksum,
                pages_with_text: pages.len(),
                chunk_count: chunks.len(),
            };
            Ok::<_, IngestError>((document, chunks))
        })();

        match file_result {
            Ok((document, chunks)) => {
                report.chunks.extend(chunks);
                report.documents.push(document);
            }
            Err(IngestError::InvalidChunkConfig(details)) => {
                return Err(IngestError::InvalidChunkConfig(details));
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), reason = %error, "skipping pdf");
                report.skipped.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    tracing::info!(
        chunk_count = report.chunks.len(),
        skipped = report.skipped.len(),
        "pdf extraction finished"
    );
    Ok(report)
}

/// Tolerant entry point: an unusable folder is logged and yields no chunks.
pub fn extract_and_chunk(folder: &Path) -> Vec<Chunk> {
    match extract_and_chunk_with(folder, &LopdfExtractor, &ChunkingConfig::default()) {
        Ok(report) => report.chunks,
        Err(error) => {
            tracing::error!(folder = %folder.display(), %error, "pdf extraction aborted");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::test_pdf::write_pdf;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn page_of(number: u32, len: usize) -> PageText {
        PageText {
            number,
            text: (0..len)
                .map(|index| char::from(b'a' + ((index + number as usize) % 26) as u8))
                .collect(),
        }
    }

    #[test]
    fn discover_pdf_files_is_flat_sorted_and_case_insensitive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("b.PDF")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt"))?;
        File::create(nested.join("c.pdf"))?;

        let names: Vec<_> = discover_pdf_files(base)
            .into_iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn two_pages_of_1200_chars_yield_three_chunks_each() -> Result<(), Box<dyn std::error::Error>> {
        let pages = vec![page_of(1, 1_200), page_of(2, 1_200)];
        let chunks = chunks_for_pages("f.pdf", &pages, &ChunkingConfig::default())?;

        let ids: Vec<_> = chunks.iter().map(|chunk| chunk.metadata.chunk_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "f.pdf-p1-c0",
                "f.pdf-p1-c1",
                "f.pdf-p1-c2",
                "f.pdf-p2-c0",
                "f.pdf-p2-c1",
                "f.pdf-p2-c2",
            ]
        );
        assert_eq!(chunks[1].text, pages[0].text[450..950]);
        assert_eq!(chunks[2].text.len(), 300);
        assert!(chunks.iter().all(|chunk| chunk.metadata.text == chunk.text));
        assert!(chunks.iter().all(|chunk| chunk.metadata.source == "f.pdf"));
        assert_eq!(chunks[3].metadata.page, 2);
        Ok(())
    }

    #[test]
    fn missing_folder_is_invalid_input_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let result = extract_and_chunk_with(&missing, &LopdfExtractor, &ChunkingConfig::default());
        assert!(matches!(result, Err(IngestError::InvalidInputPath(_))));
        assert!(extract_and_chunk(&missing).is_empty());
    }

    #[test]
    fn file_path_is_not_a_folder() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("a.pdf");
        fs::write(&file, b"%PDF-1.4")?;

        assert!(extract_and_chunk(&file).is_empty());
        Ok(())
    }

    #[test]
    fn unreadable_pdf_is_skipped_and_the_rest_still_chunked() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a_unreadable.pdf"), b"%PDF-1.4\n%broken")?;
        write_pdf(&dir.path().join("b_guide.pdf"), &["Take with food", "Store below 25C"]);

        let report =
            extract_and_chunk_with(dir.path(), &LopdfExtractor, &ChunkingConfig::default())?;

        assert!(report.is_partial());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].path.file_name().and_then(|name| name.to_str()),
            Some("a_unreadable.pdf")
        );
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].file_name, "b_guide.pdf");
        assert_eq!(report.documents[0].pages_with_text, 2);

        let ids: Vec<_> = report.chunks.iter().map(|chunk| chunk.metadata.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b_guide.pdf-p1-c0", "b_guide.pdf-p2-c0"]);
        Ok(())
    }

    #[test]
    fn bad_chunk_config_fails_before_touching_files() {
        let dir = tempdir().unwrap();
        let config = ChunkingConfig {
            chunk_size: 50,
            chunk_overlap: 50,
        };
        let result = extract_and_chunk_with(dir.path(), &LopdfExtractor, &config);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }
}
