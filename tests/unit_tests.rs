//! 单元测试

use async_trait::async_trait;
use context7_enrich::{
    cache::{cache_key, CacheIndex, DocCache, INDEX_FILE},
    client::parser::{best_match, format_docs, parse_library_results},
    client::DocsProvider,
    config::{AppConfig, CacheConfig},
    enrich::{
        enrich_with_config, insert_section,
        libraries::{detect_libraries, topic_for_step},
        Enricher, LibraryDocs,
    },
    error::Error,
    utils::validation::{parse_library_list, validate_library_name},
    Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// ============================================================================
// 测试用文档来源
// ============================================================================

/// 记录调用次数的内存文档来源
#[derive(Default)]
struct FakeProvider {
    ids: HashMap<String, String>,
    docs: HashMap<String, String>,
    resolve_calls: AtomicU32,
    docs_calls: AtomicU32,
    topics: std::sync::Mutex<Vec<Option<String>>>,
    closed: bool,
}

impl FakeProvider {
    fn with_library(mut self, name: &str, id: &str, docs: &str) -> Self {
        self.ids.insert(name.to_string(), id.to_string());
        if !docs.is_empty() {
            self.docs.insert(id.to_string(), docs.to_string());
        }
        self
    }
}

#[async_trait]
impl DocsProvider for FakeProvider {
    async fn resolve_library_id(&self, library_name: &str) -> Result<Option<String>> {
        if self.closed {
            return Err(Error::ClientClosed);
        }
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ids.get(library_name).cloned())
    }

    async fn get_library_docs(&self, library_id: &str, _tokens: u32, topic: Option<&str>) -> Result<String> {
        self.docs_calls.fetch_add(1, Ordering::SeqCst);
        self.topics.lock().unwrap().push(topic.map(str::to_string));
        Ok(self.docs.get(library_id).cloned().unwrap_or_default())
    }
}

fn temp_cache(dir: &std::path::Path) -> DocCache {
    DocCache::new(&CacheConfig {
        dir: dir.to_path_buf(),
        ..CacheConfig::default()
    })
    .expect("创建缓存失败")
}

// ============================================================================
// 编排器测试
// ============================================================================

/// 测试占位符被替换，未解析的库输出注释
#[tokio::test]
async fn test_enrich_replaces_placeholder_with_unresolved_library() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::default());
    let mut enricher = Enricher::new(provider.clone(), temp_cache(dir.path()), 3000);

    let prompt = "# Tasks\n<context7_docs></context7_docs>\nBody";
    let forced = vec!["unknownlib".to_string()];
    let out = enricher.enrich(prompt, "05-tasks", "", &forced).await.unwrap();

    assert!(!out.contains("<context7_docs>"));
    assert!(!out.contains("</context7_docs>"));
    assert!(out.contains("### Unknownlib Documentation"));
    assert!(out.contains("<!-- Could not resolve library: unknownlib -->"));
    assert_eq!(provider.resolve_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.docs_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        enricher.last_run(),
        &[("unknownlib".to_string(), LibraryDocs::Unresolved)]
    );
}

/// 测试解析成功但没有文档时输出占位注释且不写缓存
#[tokio::test]
async fn test_enrich_empty_docs_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::default().with_library("vue", "/vuejs/core", ""));
    let mut enricher = Enricher::new(provider.clone(), temp_cache(dir.path()), 3000);

    let out = enricher
        .enrich("# Prompt", "03-system-template", "Frontend in Vue.", &[])
        .await
        .unwrap();

    assert!(out.ends_with("<!-- Documentation not available for vue -->\n"));
    assert_eq!(provider.topics.lock().unwrap().as_slice(), &[Some(
        "project structure, setup, configuration, getting started".to_string()
    )]);
    assert!(!dir.path().join("vue_03-system-template.md").exists());
}

/// 测试缓存命中时不访问文档来源
#[tokio::test]
async fn test_enrich_uses_cache_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = temp_cache(dir.path());
    assert!(cache.store("react", "06-tasks-plus", "cached react docs", "/facebook/react").await);

    let provider = Arc::new(FakeProvider::default());
    let mut enricher = Enricher::new(provider.clone(), cache, 3000);
    let forced = vec!["react".to_string()];
    let out = enricher.enrich("# P", "06-tasks-plus", "", &forced).await.unwrap();

    assert!(out.contains("### React Documentation\n\ncached react docs"));
    assert_eq!(provider.resolve_calls.load(Ordering::SeqCst), 0);
    assert_eq!(provider.docs_calls.load(Ordering::SeqCst), 0);
}

/// 测试库按给定顺序输出，成功结果写入缓存
#[tokio::test]
async fn test_enrich_preserves_order_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        FakeProvider::default()
            .with_library("pytest", "/pytest-dev/pytest", "pytest docs")
            .with_library("django", "/django/django", "django docs"),
    );
    let mut enricher = Enricher::new(provider, temp_cache(dir.path()), 3000);
    let forced = vec!["pytest".to_string(), "django".to_string()];
    let out = enricher.enrich("# P", "07-tests", "", &forced).await.unwrap();

    let pytest_at = out.find("### Pytest Documentation").unwrap();
    let django_at = out.find("### Django Documentation").unwrap();
    assert!(pytest_at < django_at);

    let index = CacheIndex::load(&dir.path().join(INDEX_FILE)).unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(
        index.get(&cache_key("django", "07-tests")).unwrap().library_id,
        "/django/django"
    );
}

/// 测试关闭的客户端错误会向上传播
#[tokio::test]
async fn test_enrich_propagates_closed_client() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider {
        closed: true,
        ..FakeProvider::default()
    });
    let mut enricher = Enricher::new(provider, temp_cache(dir.path()), 3000);
    let forced = vec!["react".to_string()];
    let result = enricher.enrich("# P", "01-prd", "", &forced).await;
    assert!(matches!(result, Err(Error::ClientClosed)));
}

/// 测试缓存目录不可用时原样返回模板
#[tokio::test]
async fn test_unusable_cache_dir_leaves_prompt_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file in the way").unwrap();

    let mut config = AppConfig::default();
    config.cache.dir = blocker;

    let prompt = "# Prompt\n<context7_docs>";
    let forced = vec!["react".to_string()];
    let outcome = enrich_with_config(&config, prompt, "01-prd", "", &forced).await;

    assert_eq!(outcome.prompt, prompt);
    assert!(outcome.placeholders.is_empty());
    assert!(!outcome.auth_failed);
}

/// 测试禁用 Context7 时原样返回模板
#[tokio::test]
async fn test_disabled_integration_leaves_prompt_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.context7.enabled = false;
    config.cache.dir = dir.path().join("cache");

    let prompt = "# Prompt built with React";
    let outcome = enrich_with_config(&config, prompt, "01-prd", "built with React", &[]).await;

    assert_eq!(outcome.prompt, prompt);
    assert!(!config.cache.dir.exists());
}

/// 测试插入位置
#[test]
fn test_insert_section_appends_without_heading() {
    assert_eq!(insert_section("just text", "S"), "just text\n\nS");
}

// ============================================================================
// 解析测试
// ============================================================================

/// 测试库搜索结果解析与评分
#[test]
fn test_parse_and_pick_best_library() {
    let text = "- Title: Express\n- Context7-compatible library ID: /expressjs/express\n- Trust Score: 9\n----------\n- Title: express-session\n- Context7-compatible library ID: /expressjs/session\n- Trust Score: 10\n----------\n- Title: No ID here";
    let candidates = parse_library_results(text);
    assert_eq!(candidates.len(), 2);
    assert_eq!(best_match(&candidates, "express").unwrap().library_id, "/expressjs/express");
}

/// 测试代码块原样保留
#[test]
fn test_format_docs_keeps_code_verbatim() {
    let out = format_docs("```rust\nfn main() {}\n```");
    assert!(out.contains("```rust\nfn main() {}\n```"));
}

// ============================================================================
// 检测与校验测试
// ============================================================================

/// 测试库检测
#[test]
fn test_detect_libraries_from_prose() {
    let text = "The backend is based on Django with a PostgreSQL database: redis for caching.";
    assert_eq!(detect_libraries(text), vec!["django", "postgresql", "redis"]);
}

/// 测试步骤主题
#[test]
fn test_topic_for_step_variants() {
    assert_eq!(topic_for_step("5-tasks"), topic_for_step("05-tasks"));
    assert_eq!(topic_for_step("unknown"), "api reference, getting started, best practices");
}

/// 测试库名校验
#[test]
fn test_library_name_validation() {
    assert!(validate_library_name("react-router").is_ok());
    assert!(validate_library_name("").is_err());
    assert!(validate_library_name("bad name").is_err());
    assert!(validate_library_name(&"a".repeat(51)).is_err());
    assert_eq!(parse_library_list("react, fastapi").unwrap(), vec!["react", "fastapi"]);
    assert!(parse_library_list("react,,vue").is_err());
}

// ============================================================================
// 配置测试
// ============================================================================

/// 测试环境变量覆盖
#[test]
fn test_config_from_env() {
    temp_env::with_vars(
        [
            ("CONTEXT7_ENRICH_BASE_URL", Some("http://127.0.0.1:9000")),
            ("CONTEXT7_ENRICH_CACHE_DIR", Some("/tmp/c7-cache")),
            ("CONTEXT7_ENRICH_LOG_LEVEL", Some("debug")),
            ("CONTEXT7_ENRICH_ENABLED", Some("false")),
        ],
        || {
            let env = AppConfig::from_env().unwrap();
            let merged = AppConfig::merge(None, Some(env));
            assert_eq!(merged.context7.base_url, "http://127.0.0.1:9000");
            assert_eq!(merged.cache.dir, std::path::PathBuf::from("/tmp/c7-cache"));
            assert_eq!(merged.logging.level, "debug");
            assert!(!merged.context7.enabled);
        },
    );
}

/// 测试无效的环境变量值
#[test]
fn test_config_from_env_rejects_bad_switch() {
    temp_env::with_var("CONTEXT7_ENRICH_ENABLED", Some("maybe"), || {
        assert!(AppConfig::from_env().is_err());
    });
}

/// 测试 API Key 从配置的环境变量读取
#[test]
fn test_api_key_env() {
    let config = AppConfig::default();
    temp_env::with_var(&config.context7.api_key_env, Some("ctx7sk-abc"), || {
        assert_eq!(config.context7.api_key().as_deref(), Some("ctx7sk-abc"));
    });
    temp_env::with_var_unset(&config.context7.api_key_env, || {
        assert_eq!(config.context7.api_key(), None);
    });
}
