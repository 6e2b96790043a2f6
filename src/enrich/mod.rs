//! Prompt enrichment with Context7 library documentation
//!
//! Enrichment is strictly additive: every per-library failure turns into an
//! HTML-comment placeholder inside the generated section, and a prompt with
//! no detected libraries comes back untouched. The only error surfaced to the
//! caller is use of a closed client.

pub mod libraries;

use crate::cache::DocCache;
use crate::client::{Context7Client, DocsProvider};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::utils::string::title_case;
use std::path::Path;
use std::sync::Arc;

/// Opening placeholder marker a template may carry
pub const PLACEHOLDER_OPEN: &str = "<context7_docs>";

/// Optional closing placeholder marker
pub const PLACEHOLDER_CLOSE: &str = "</context7_docs>";

/// Heading of the generated documentation section
pub const SECTION_HEADING: &str = "## Context7 Library Documentation";

const SECTION_INTRO: &str = "*The following documentation has been fetched from Context7 to provide \
current, accurate information about the libraries mentioned in this project.*";

/// Outcome of fetching docs for one library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryDocs {
    /// Documentation from the cache or a fresh fetch
    Found(String),
    /// The library name could not be resolved to an identifier
    Unresolved,
    /// The library resolved but no documentation came back
    Unavailable,
}

impl LibraryDocs {
    /// Text placed under the library's subheading
    #[must_use]
    pub fn render(&self, library: &str) -> String {
        match self {
            LibraryDocs::Found(docs) => docs.clone(),
            LibraryDocs::Unresolved => format!("<!-- Could not resolve library: {library} -->"),
            LibraryDocs::Unavailable => format!("<!-- Documentation not available for {library} -->"),
        }
    }

    /// Whether this is a placeholder rather than real documentation
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        !matches!(self, LibraryDocs::Found(_))
    }
}

/// Enrichment orchestrator
pub struct Enricher {
    provider: Arc<dyn DocsProvider>,
    cache: DocCache,
    tokens: u32,
    last_run: Vec<(String, LibraryDocs)>,
}

impl Enricher {
    /// Create an orchestrator owning its cache
    #[must_use]
    pub fn new(provider: Arc<dyn DocsProvider>, cache: DocCache, tokens: u32) -> Self {
        Self {
            provider,
            cache,
            tokens,
            last_run: Vec::new(),
        }
    }

    /// The owned documentation cache
    #[must_use]
    pub fn cache(&self) -> &DocCache {
        &self.cache
    }

    /// Mutable access to the owned documentation cache
    pub fn cache_mut(&mut self) -> &mut DocCache {
        &mut self.cache
    }

    /// Per-library outcomes of the most recent [`Enricher::enrich`] call
    #[must_use]
    pub fn last_run(&self) -> &[(String, LibraryDocs)] {
        &self.last_run
    }

    /// Libraries to enrich with.
    ///
    /// A non-empty forced list wins. Otherwise: libraries detected in
    /// `previous`, followed by the step's recommended libraries that the text
    /// mentions verbatim.
    #[must_use]
    pub fn candidate_libraries(step: &str, previous: &str, forced: &[String]) -> Vec<String> {
        if !forced.is_empty() {
            return forced.to_vec();
        }

        let mut libraries = libraries::detect_libraries(previous);
        let lower = previous.to_lowercase();
        for lib in libraries::recommended_libraries(step) {
            if !libraries.iter().any(|l| l == lib) && lower.contains(lib) {
                libraries.push((*lib).to_string());
            }
        }
        libraries
    }

    /// Produce the enriched prompt for `step`.
    ///
    /// # Errors
    ///
    /// Only [`Error::ClientClosed`]; every other failure degrades into a
    /// placeholder.
    pub async fn enrich(&mut self, prompt: &str, step: &str, previous: &str, forced: &[String]) -> Result<String> {
        self.last_run.clear();

        let libraries = Self::candidate_libraries(step, previous, forced);
        if libraries.is_empty() {
            return Ok(prompt.to_string());
        }

        for library in libraries {
            let docs = self.library_docs(&library, step).await?;
            self.last_run.push((library, docs));
        }

        let rendered: Vec<(String, String)> = self
            .last_run
            .iter()
            .map(|(library, docs)| (library.clone(), docs.render(library)))
            .collect();

        Ok(insert_section(prompt, &format_section(&rendered)))
    }

    async fn library_docs(&mut self, library: &str, step: &str) -> Result<LibraryDocs> {
        if let Some(cached) = self.cache.lookup(library, step).await {
            tracing::debug!("Using cached documentation for {library} ({step})");
            return Ok(LibraryDocs::Found(cached));
        }

        let library_id = match self.provider.resolve_library_id(library).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!("Could not resolve library: {library}");
                return Ok(LibraryDocs::Unresolved);
            }
            Err(Error::ClientClosed) => return Err(Error::ClientClosed),
            Err(e) => {
                tracing::warn!("Could not resolve library {library}: {e}");
                return Ok(LibraryDocs::Unresolved);
            }
        };

        let topic = libraries::topic_for_step(step);
        let docs = match self.provider.get_library_docs(&library_id, self.tokens, Some(topic)).await {
            Ok(docs) => docs,
            Err(Error::ClientClosed) => return Err(Error::ClientClosed),
            Err(e) => {
                tracing::warn!("Could not fetch docs for {library} (ID: {library_id}): {e}");
                String::new()
            }
        };

        if docs.trim().is_empty() {
            tracing::warn!("No documentation found for {library} (ID: {library_id})");
            return Ok(LibraryDocs::Unavailable);
        }

        self.cache.store(library, step, &docs, &library_id).await;
        Ok(LibraryDocs::Found(docs))
    }
}

/// Outcome of [`enrich_with_config`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichOutcome {
    /// The enriched prompt, or the template unchanged
    pub prompt: String,
    /// Placeholder comments emitted in place of documentation
    pub placeholders: Vec<String>,
    /// Whether Context7 rejected the API key
    pub auth_failed: bool,
}

impl EnrichOutcome {
    fn passthrough(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            ..Self::default()
        }
    }
}

/// Run one enrichment with a client and cache built from `config`.
///
/// Never fails: a disabled integration, a cache directory that cannot be
/// created, a client that cannot be built or a failed run all fall back to
/// the template unchanged.
pub async fn enrich_with_config(
    config: &AppConfig,
    prompt: &str,
    step: &str,
    previous: &str,
    forced: &[String],
) -> EnrichOutcome {
    if !config.context7.enabled {
        tracing::info!("Context7 integration disabled, leaving prompt unchanged");
        return EnrichOutcome::passthrough(prompt);
    }

    let cache = match DocCache::new(&config.cache) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!("Context7 cache unavailable at {}: {e}", config.cache.dir.display());
            return EnrichOutcome::passthrough(prompt);
        }
    };

    let client = match Context7Client::new(&config.context7) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!("Could not create Context7 client: {e}");
            return EnrichOutcome::passthrough(prompt);
        }
    };

    let mut enricher = Enricher::new(client.clone(), cache, config.context7.default_tokens);
    let outcome = match enricher.enrich(prompt, step, previous, forced).await {
        Ok(enriched) => EnrichOutcome {
            prompt: enriched,
            placeholders: enricher
                .last_run()
                .iter()
                .filter(|(_, docs)| docs.is_placeholder())
                .map(|(library, docs)| docs.render(library))
                .collect(),
            auth_failed: client.auth_failed(),
        },
        Err(e) => {
            tracing::warn!("Context7 enrichment failed: {e}");
            EnrichOutcome::passthrough(prompt)
        }
    };

    client.close();
    outcome
}

/// Build the documentation section from `(library, text)` pairs, in order
#[must_use]
pub fn format_section(library_docs: &[(String, String)]) -> String {
    if library_docs.is_empty() {
        return String::new();
    }

    let mut parts = vec![format!("{SECTION_HEADING}\n"), format!("{SECTION_INTRO}\n")];
    for (library, docs) in library_docs {
        parts.push(format!("### {} Documentation\n", title_case(library)));
        parts.push(docs.clone());
        parts.push(String::new());
    }
    parts.join("\n")
}

/// Place `section` into `prompt`.
///
/// The placeholder marker is replaced when present. Otherwise the section goes
/// right before the first second-level heading found after the third line,
/// or is appended at the end.
#[must_use]
pub fn insert_section(prompt: &str, section: &str) -> String {
    if prompt.contains(PLACEHOLDER_OPEN) {
        return prompt
            .replace(PLACEHOLDER_OPEN, section)
            .replace(PLACEHOLDER_CLOSE, "");
    }

    let mut lines: Vec<&str> = prompt.split('\n').collect();
    let heading = lines
        .iter()
        .enumerate()
        .skip(3)
        .find(|(_, line)| is_second_level_heading(line))
        .map(|(i, _)| i);

    match heading {
        Some(index) => {
            lines.insert(index, section);
            lines.join("\n")
        }
        None => format!("{prompt}\n\n{section}"),
    }
}

fn is_second_level_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("##") && !trimmed.starts_with("###")
}

/// Human-readable detection report for a workflow step.
///
/// `step` is the step whose prompt is about to be generated, so its
/// recommended libraries are the ones listed for the upcoming prompt.
#[must_use]
pub fn context_report(step: &str, detected: &[String], cache_dir: &Path) -> String {
    let mut out = vec![
        format!("📚 Context7 Library Detection for Step: {step}"),
        "━".repeat(40),
    ];

    if detected.is_empty() {
        out.push("\n❌ No libraries detected in the current content.".to_string());
        out.push("   You can manually specify libraries using:".to_string());
        out.push(format!("   {} detect --step {step} --libraries react,fastapi,postgresql", crate::NAME));
    } else {
        out.push("\n🔍 Detected Libraries:".to_string());
        out.extend(detected.iter().map(|lib| format!("  • {lib}")));
        out.push("\n💡 These libraries will be included in the next prompt generation.".to_string());
        out.push("   Documentation will be fetched via Context7 to provide:".to_string());
        out.push("   - Current API references".to_string());
        out.push("   - Best practices and patterns".to_string());
        out.push("   - Version-specific information".to_string());
    }

    let recommended: Vec<&str> = libraries::recommended_libraries(step)
        .iter()
        .copied()
        .filter(|lib| !detected.iter().any(|d| d == lib))
        .collect();
    if !recommended.is_empty() {
        out.push(format!("\n📋 Recommended for the next prompt ({step}):"));
        out.extend(recommended.iter().map(|lib| format!("  • {lib} (add with: --libraries {lib})")));
    }

    out.push(format!("\n📁 Documentation cache location: {}", cache_dir.display()));
    out.join("\n")
}
