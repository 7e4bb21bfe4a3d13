//! Per-client indexing session.
//!
//! An [`Indexer`] enforces the Initialize → BeginProject → BeginFile →
//! IndexToken* → EndFile → EndProject protocol for one analyzer. In-flight
//! bookkeeping lives behind a short-lived lock that is never held across a
//! store write; the writes themselves go through the session's
//! [`StoreWriter`], which runs them one at a time.
//!
//! Calls for different files of one project may interleave. Calls for the same
//! file are ordered by the file's own async lock, so sequence ids and content
//! follow the order in which token calls acquire it.

pub mod markup;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{IndexError, StoreError};
use crate::host::client_id::ClientId;
use crate::index::style::upsert_style;
use crate::index::symbol::{insert_occurrence, normalize_symbol_kind, normalize_symbol_name, upsert_symbol, SymbolKey};
use crate::index::tree::{begin_file, begin_project_folder, resolve_folder_path, set_file_content};
use crate::index::writer::StoreWriter;
use crate::index::{normalize_path, path_segments, Occurrence, OccurrenceKind, ReferenceKind, Style};

use self::markup::{is_plain_text, normalize_class_name, FileContent};

/// Display attributes sent with Initialize
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDefinition {
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub font_weight: Option<String>,
}

/// A symbol as named by the analyzer, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSymbol {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
}

impl TokenSymbol {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind.into()),
        }
    }
}

/// One classified token of a file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub classification: String,
    pub text: String,
    #[serde(default)]
    pub declared_symbol: Option<TokenSymbol>,
    #[serde(default)]
    pub referenced_symbol: Option<TokenSymbol>,
    #[serde(default)]
    pub reference_kind: Option<ReferenceKind>,
    #[serde(default)]
    pub implemented_symbols: Vec<TokenSymbol>,
}

impl Token {
    pub fn new(classification: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            classification: classification.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn declaring(mut self, symbol: TokenSymbol) -> Self {
        self.declared_symbol = Some(symbol);
        self
    }

    pub fn referencing(mut self, symbol: TokenSymbol) -> Self {
        self.referenced_symbol = Some(symbol);
        self
    }

    pub fn implementing(mut self, symbol: TokenSymbol) -> Self {
        self.implemented_symbols.push(symbol);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Uninitialized,
    Initializing,
    Initialized,
}

struct SessionState {
    init: InitState,
    project: Option<ActiveProject>,
}

struct ActiveProject {
    path: String,
    /// None until the project folder has been written
    folder_id: Option<i64>,
    files: HashMap<String, Arc<tokio::sync::Mutex<ActiveFile>>>,
}

struct ActiveFile {
    /// None until the file row has been written
    row_id: Option<i64>,
    content: FileContent,
    next_declaration: u32,
    next_reference: u32,
    next_implementation: u32,
    ended: bool,
}

impl ActiveFile {
    fn new(line_count: u32) -> Self {
        Self {
            row_id: None,
            content: FileContent::with_gutter(line_count),
            next_declaration: 1,
            next_reference: 1,
            next_implementation: 1,
            ended: false,
        }
    }

    fn counter(&mut self, kind: OccurrenceKind) -> &mut u32 {
        match kind {
            OccurrenceKind::Declaration => &mut self.next_declaration,
            OccurrenceKind::Reference => &mut self.next_reference,
            OccurrenceKind::Implementation => &mut self.next_implementation,
        }
    }
}

/// Work a session was still holding when it was dropped from the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWork {
    pub project: String,
    pub open_files: usize,
}

/// One analyzer's indexing session
pub struct Indexer {
    client_id: ClientId,
    writer: StoreWriter,
    state: Mutex<SessionState>,
    last_activity: Mutex<Instant>,
}

impl Indexer {
    pub fn new(client_id: ClientId, writer: StoreWriter) -> Self {
        Self {
            client_id,
            writer,
            state: Mutex::new(SessionState {
                init: InitState::Uninitialized,
                project: None,
            }),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn language(&self) -> &str {
        self.client_id.language()
    }

    /// Time since the last call on this session
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// The active project, if any, and how many of its files are still open
    pub fn pending_work(&self) -> Option<PendingWork> {
        let state = self.state.lock();
        state.project.as_ref().map(|project| PendingWork {
            project: project.path.clone(),
            open_files: project.files.len(),
        })
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn ensure_initialized(&self) -> Result<(), IndexError> {
        self.touch();
        match self.state.lock().init {
            InitState::Initialized => Ok(()),
            _ => Err(IndexError::NotInitialized),
        }
    }

    /// Store the session's style definitions. Must be the first call, and
    /// may only succeed once.
    pub async fn initialize(&self, styles: &BTreeMap<String, StyleDefinition>) -> Result<(), IndexError> {
        self.touch();
        {
            let mut state = self.state.lock();
            if state.init != InitState::Uninitialized {
                return Err(IndexError::AlreadyInitialized);
            }
            state.init = InitState::Initializing;
        }

        let styles: Vec<Style> = styles
            .iter()
            .map(|(name, definition)| Style {
                name: normalize_class_name(self.language(), name),
                color: definition.color.clone(),
                background_color: definition.background_color.clone(),
                font_weight: definition.font_weight.clone(),
            })
            .collect();
        let count = styles.len();

        let result = self
            .writer
            .modify(move |tx| {
                for style in &styles {
                    upsert_style(tx, style)?;
                }
                Ok(())
            })
            .await;

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.init = InitState::Initialized;
                info!("Session {} initialized with {} style(s)", self.client_id, count);
                Ok(())
            }
            Err(e) => {
                state.init = InitState::Uninitialized;
                Err(e.into())
            }
        }
    }

    /// Start (re)indexing the project at `path`. Everything previously
    /// indexed under the project folder is discarded. Returns the project id.
    pub async fn begin_project(&self, path: &str) -> Result<String, IndexError> {
        self.ensure_initialized()?;

        let path = normalize_path(path);
        if path.is_empty() {
            return Err(IndexError::InvalidPath(path));
        }

        {
            let mut state = self.state.lock();
            if state.project.is_some() {
                return Err(IndexError::ProjectAlreadyActive);
            }
            state.project = Some(ActiveProject {
                path: path.clone(),
                folder_id: None,
                files: HashMap::new(),
            });
        }

        let segments: Vec<String> = path_segments(&path).into_iter().map(String::from).collect();
        let result = self
            .writer
            .modify(move |tx| {
                let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
                begin_project_folder(tx, &segments)
            })
            .await;

        let mut state = self.state.lock();
        match result {
            Ok(folder) => {
                if let Some(project) = state.project.as_mut() {
                    project.folder_id = Some(folder);
                }
                info!("Session {} began project {} (folder {})", self.client_id, path, folder);
                Ok(folder.to_string())
            }
            Err(e) => {
                state.project = None;
                Err(e.into())
            }
        }
    }

    /// Open a file of the active project. `path` is relative to the project
    /// folder. Returns the file id used by subsequent token calls.
    pub async fn begin_file(&self, project_id: &str, path: &str, line_count: u32, length: u64) -> Result<String, IndexError> {
        self.ensure_initialized()?;

        let file_id = normalize_path(path);
        let mut dirs: Vec<String> = path_segments(&file_id).into_iter().map(String::from).collect();
        let Some(name) = dirs.pop() else {
            return Err(IndexError::InvalidPath(path.to_string()));
        };

        let (project_folder, file, mut guard) = {
            let mut state = self.state.lock();
            let project = state.project.as_mut().ok_or(IndexError::NoActiveProject)?;
            let folder = project.folder_id.ok_or(IndexError::ProjectPending)?;
            if project_id != folder.to_string() {
                return Err(IndexError::InvalidProjectId(project_id.to_string()));
            }
            if project.files.contains_key(&file_id) {
                return Err(IndexError::FileAlreadyOpen(file_id));
            }

            // Hold the file until its row exists so early tokens wait for it
            let file = Arc::new(tokio::sync::Mutex::new(ActiveFile::new(line_count)));
            let guard = file
                .clone()
                .try_lock_owned()
                .map_err(|_| IndexError::FileAlreadyOpen(file_id.clone()))?;
            project.files.insert(file_id.clone(), file.clone());
            (folder, file, guard)
        };

        let result = self
            .writer
            .modify(move |tx| {
                let dirs: Vec<&str> = dirs.iter().map(String::as_str).collect();
                let folder = resolve_folder_path(tx, project_folder, &dirs)?;
                begin_file(tx, folder, &name, line_count, length)
            })
            .await;

        match result {
            Ok(row) => {
                guard.row_id = Some(row);
                debug!("Session {} began file {} (row {})", self.client_id, file_id, row);
                Ok(file_id)
            }
            Err(e) => {
                guard.ended = true;
                drop(guard);
                self.forget_file(&file_id, &file);
                Err(e.into())
            }
        }
    }

    /// Append one token to an open file, recording any symbol occurrences it
    /// carries. Each occurrence is written independently; the span is emitted
    /// with the anchors that were recorded and the first failure is returned.
    pub async fn index_token(&self, file_id: &str, token: Token) -> Result<(), IndexError> {
        self.ensure_initialized()?;

        let file_id = normalize_path(file_id);
        let file = self.open_file(&file_id)?;
        let mut file = file.lock().await;
        if file.ended {
            return Err(IndexError::UnknownFile(file_id));
        }
        let row = file.row_id.ok_or_else(|| IndexError::UnknownFile(file_id.clone()))?;

        if is_plain_text(&token.classification) {
            file.content.push_text(&token.text);
            return Ok(());
        }

        let class = normalize_class_name(self.language(), &token.classification);
        let mut roles: Vec<(OccurrenceKind, &TokenSymbol)> = Vec::new();
        if let Some(symbol) = &token.declared_symbol {
            roles.push((OccurrenceKind::Declaration, symbol));
        }
        if let Some(symbol) = &token.referenced_symbol {
            roles.push((OccurrenceKind::Reference, symbol));
        }
        for symbol in &token.implemented_symbols {
            roles.push((OccurrenceKind::Implementation, symbol));
        }

        let mut anchors = Vec::with_capacity(roles.len());
        let mut first_error: Option<StoreError> = None;

        for (kind, symbol) in roles {
            let seq = *file.counter(kind);
            let reference_kind = match kind {
                OccurrenceKind::Reference => Some(token.reference_kind.unwrap_or_default()),
                _ => None,
            };

            match self.record_occurrence(kind, symbol, row, seq, reference_kind).await {
                Ok(()) => {
                    *file.counter(kind) += 1;
                    anchors.push(kind.anchor(seq));
                }
                Err(e) => {
                    warn!(
                        "Session {}: failed to record {} of '{}' in {}: {}",
                        self.client_id,
                        kind.as_str(),
                        symbol.name,
                        file_id,
                        e
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        file.content.push_span(&class, &anchors, &token.text);

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn record_occurrence(
        &self,
        kind: OccurrenceKind,
        symbol: &TokenSymbol,
        file_id: i64,
        file_seq: u32,
        reference_kind: Option<ReferenceKind>,
    ) -> Result<(), StoreError> {
        let name = normalize_symbol_name(self.language(), &symbol.name);
        let symbol_kind = normalize_symbol_kind(self.language(), symbol.kind.as_deref().unwrap_or(""));
        let key = SymbolKey::for_name(&name);

        self.writer
            .modify(move |tx| {
                upsert_symbol(tx, &key, &name, &symbol_kind)?;
                insert_occurrence(
                    tx,
                    &Occurrence {
                        kind,
                        symbol_id: key,
                        file_id,
                        file_seq,
                        reference_kind,
                    },
                )
            })
            .await
    }

    /// Finalize and store a file's content, then close it.
    pub async fn end_file(&self, file_id: &str) -> Result<(), IndexError> {
        self.ensure_initialized()?;

        let file_id = normalize_path(file_id);
        let file = self.open_file(&file_id)?;
        let mut guard = file.lock().await;
        if guard.ended {
            return Err(IndexError::UnknownFile(file_id));
        }
        let row = guard.row_id.ok_or_else(|| IndexError::UnknownFile(file_id.clone()))?;

        guard.ended = true;
        let content = guard.content.finish();
        drop(guard);

        let result = self
            .writer
            .modify(move |tx| set_file_content(tx, row, &content))
            .await;

        self.forget_file(&file_id, &file);
        match result {
            Ok(()) => {
                debug!("Session {} ended file {}", self.client_id, file_id);
                Ok(())
            }
            Err(e) => {
                warn!("Session {}: content of {} was not stored: {}", self.client_id, file_id, e);
                Err(e.into())
            }
        }
    }

    /// Close the active project. Every file begun under it must be ended.
    pub fn end_project(&self, project_id: &str) -> Result<(), IndexError> {
        self.ensure_initialized()?;

        let mut state = self.state.lock();
        let project = state.project.as_ref().ok_or(IndexError::NoActiveProject)?;
        let folder = project.folder_id.ok_or(IndexError::ProjectPending)?;
        if project_id != folder.to_string() {
            return Err(IndexError::InvalidProjectId(project_id.to_string()));
        }
        if !project.files.is_empty() {
            return Err(IndexError::FilesPending(project.files.len()));
        }

        info!("Session {} ended project {}", self.client_id, project.path);
        state.project = None;
        Ok(())
    }

    fn open_file(&self, file_id: &str) -> Result<Arc<tokio::sync::Mutex<ActiveFile>>, IndexError> {
        let state = self.state.lock();
        let project = state.project.as_ref().ok_or(IndexError::NoActiveProject)?;
        project
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| IndexError::UnknownFile(file_id.to_string()))
    }

    /// Drop a file from the active set if the entry is still this one
    fn forget_file(&self, file_id: &str, file: &Arc<tokio::sync::Mutex<ActiveFile>>) {
        let mut state = self.state.lock();
        if let Some(project) = state.project.as_mut() {
            if project.files.get(file_id).is_some_and(|current| Arc::ptr_eq(current, file)) {
                project.files.remove(file_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::db::IndexDatabase;
    use crate::index::retry::RetryPolicy;
    use crate::index::ROOT_FOLDER_ID;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        db: IndexDatabase,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let db = IndexDatabase::new(dir.path().join("index.db")).unwrap();
            Self { _dir: dir, db }
        }

        fn indexer(&self, language: &str) -> Indexer {
            let client = ClientId::create(language);
            let writer = self.db.spawn_writer(RetryPolicy::default(), client.token()).unwrap();
            Indexer::new(client, writer)
        }

        fn count(&self, sql: &str) -> i64 {
            self.db.get_conn().unwrap().query_row(sql, [], |row| row.get(0)).unwrap()
        }
    }

    fn kw_styles() -> BTreeMap<String, StyleDefinition> {
        let mut styles = BTreeMap::new();
        styles.insert(
            "kw".to_string(),
            StyleDefinition {
                color: Some("blue".to_string()),
                ..Default::default()
            },
        );
        styles
    }

    async fn ready(fixture: &Fixture) -> Indexer {
        let indexer = fixture.indexer("csharp");
        indexer.initialize(&kw_styles()).await.unwrap();
        indexer
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;

        let project = indexer.begin_project("src/test").await.unwrap();
        let file = indexer.begin_file(&project, "foo.cs", 3, 50).await.unwrap();
        indexer.index_token(&file, Token::new("kw", "class")).await.unwrap();
        indexer
            .index_token(&file, Token::new("i", "Foo").declaring(TokenSymbol::new("T:Foo", "class")))
            .await
            .unwrap();
        indexer.end_file(&file).await.unwrap();
        indexer.end_project(&project).unwrap();

        let symbols = fixture.db.search_symbols("%", 10).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "csharp:T:Foo");
        assert_eq!(symbols[0].kind, "csharp:class");

        let stored = fixture.db.find_file("src/test/foo.cs").unwrap().unwrap();
        let declarations = fixture
            .db
            .occurrences_of(OccurrenceKind::Declaration, &symbols[0].id)
            .unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].file_id, stored.id);
        assert_eq!(declarations[0].file_seq, 1);

        let content = stored.content.unwrap();
        assert_eq!(content.matches("<span ").count(), 2);
        assert!(content.contains("<span class='csharp-kw'>class</span>"));
        assert!(content.contains("<span class='csharp-i' id='d-1'>Foo</span>"));
        assert!(content.contains("<a id='line-3' href='#line-3'>3</a>"));
        assert!(content.ends_with("</pre></td></tr></table></div>"));

        let styles = fixture.db.styles().unwrap();
        assert_eq!(styles.len(), 1);
        assert_eq!(styles[0].name, "csharp-kw");
        assert_eq!(styles[0].color.as_deref(), Some("blue"));
    }

    #[tokio::test]
    async fn test_calls_before_initialize_fail() {
        let fixture = Fixture::new();
        let indexer = fixture.indexer("csharp");

        assert!(matches!(indexer.begin_project("p").await, Err(IndexError::NotInitialized)));
        assert!(matches!(indexer.begin_file("1", "a.cs", 1, 1).await, Err(IndexError::NotInitialized)));
        assert!(matches!(
            indexer.index_token("a.cs", Token::new("kw", "x")).await,
            Err(IndexError::NotInitialized)
        ));
        assert!(matches!(indexer.end_file("a.cs").await, Err(IndexError::NotInitialized)));
        assert!(matches!(indexer.end_project("1"), Err(IndexError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;
        assert!(matches!(
            indexer.initialize(&kw_styles()).await,
            Err(IndexError::AlreadyInitialized)
        ));
        // Still usable
        indexer.begin_project("p").await.unwrap();
    }

    #[tokio::test]
    async fn test_project_state_violations() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;

        assert!(matches!(indexer.begin_file("2", "a.cs", 1, 1).await, Err(IndexError::NoActiveProject)));
        assert!(matches!(indexer.end_project("2"), Err(IndexError::NoActiveProject)));
        assert!(matches!(indexer.begin_project("//").await, Err(IndexError::InvalidPath(_))));

        let project = indexer.begin_project("p").await.unwrap();
        assert!(matches!(indexer.begin_project("q").await, Err(IndexError::ProjectAlreadyActive)));
        assert!(matches!(
            indexer.begin_file("999", "a.cs", 1, 1).await,
            Err(IndexError::InvalidProjectId(_))
        ));
        assert!(matches!(indexer.end_project("999"), Err(IndexError::InvalidProjectId(_))));
        assert!(matches!(indexer.begin_file(&project, "/", 1, 1).await, Err(IndexError::InvalidPath(_))));
        let file = indexer.begin_file(&project, "dir/", 1, 1).await.unwrap();
        assert_eq!(file, "dir");
        indexer.end_file(&file).await.unwrap();
        indexer.end_project(&project).unwrap();
    }

    #[tokio::test]
    async fn test_file_protocol_violations() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;
        let project = indexer.begin_project("p").await.unwrap();

        let file = indexer.begin_file(&project, "a/b.cs", 1, 1).await.unwrap();
        assert_eq!(file, "a/b.cs");
        assert!(matches!(
            indexer.begin_file(&project, "a\\b.cs", 1, 1).await,
            Err(IndexError::FileAlreadyOpen(_))
        ));
        assert!(matches!(
            indexer.index_token("nope.cs", Token::new("kw", "x")).await,
            Err(IndexError::UnknownFile(_))
        ));
        assert!(matches!(indexer.end_file("nope.cs").await, Err(IndexError::UnknownFile(_))));

        indexer.end_file(&file).await.unwrap();
        assert!(matches!(indexer.end_file(&file).await, Err(IndexError::UnknownFile(_))));
        assert!(matches!(
            indexer.index_token(&file, Token::new("kw", "x")).await,
            Err(IndexError::UnknownFile(_))
        ));
    }

    #[tokio::test]
    async fn test_end_project_waits_for_open_files() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;
        let project = indexer.begin_project("p").await.unwrap();
        let a = indexer.begin_file(&project, "a.cs", 1, 1).await.unwrap();
        let b = indexer.begin_file(&project, "b.cs", 1, 1).await.unwrap();

        assert!(matches!(indexer.end_project(&project), Err(IndexError::FilesPending(2))));
        indexer.end_file(&a).await.unwrap();
        assert!(matches!(indexer.end_project(&project), Err(IndexError::FilesPending(1))));
        assert_eq!(
            indexer.pending_work(),
            Some(PendingWork {
                project: "p".to_string(),
                open_files: 1
            })
        );
        indexer.end_file(&b).await.unwrap();
        indexer.end_project(&project).unwrap();
        assert_eq!(indexer.pending_work(), None);
    }

    #[tokio::test]
    async fn test_declaration_sequence_has_no_gaps() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;
        let project = indexer.begin_project("p").await.unwrap();
        let file = indexer.begin_file(&project, "many.cs", 10, 100).await.unwrap();

        for i in 0..25 {
            let token = Token::new("i", format!("x{}", i)).declaring(TokenSymbol::new(format!("F:x{}", i), "field"));
            indexer.index_token(&file, token).await.unwrap();
            indexer.index_token(&file, Token::new("text", " ")).await.unwrap();
        }
        indexer.end_file(&file).await.unwrap();

        let stored = fixture.db.find_file("p/many.cs").unwrap().unwrap();
        let seqs = fixture
            .db
            .file_sequence_ids(OccurrenceKind::Declaration, stored.id)
            .unwrap();
        assert_eq!(seqs, (1..=25).collect::<Vec<u32>>());
        assert!(stored.content.unwrap().contains("id='d-25'"));
    }

    #[tokio::test]
    async fn test_multiple_roles_on_one_token() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;
        let project = indexer.begin_project("p").await.unwrap();
        let file = indexer.begin_file(&project, "a.cs", 1, 10).await.unwrap();

        let mut token = Token::new("i", "Run")
            .referencing(TokenSymbol::new("M:IRunner.Run", "method"))
            .implementing(TokenSymbol::new("M:IRunner.Run", "method"))
            .implementing(TokenSymbol::new("M:IJob.Run", "method"));
        token.reference_kind = Some(ReferenceKind::Implementation);
        indexer.index_token(&file, token).await.unwrap();
        indexer.end_file(&file).await.unwrap();

        let content = fixture.db.find_file("p/a.cs").unwrap().unwrap().content.unwrap();
        assert!(content.contains("<span class='csharp-i' id='r-1'><a id='i-1'></a><a id='i-2'></a>Run</span>"));

        let runner = SymbolKey::for_name("csharp:M:IRunner.Run");
        let references = fixture.db.occurrences_of(OccurrenceKind::Reference, &runner).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].reference_kind, Some(ReferenceKind::Implementation));
        assert_eq!(fixture.count("SELECT COUNT(*) FROM implementations"), 2);
        assert_eq!(fixture.count("SELECT COUNT(*) FROM symbols"), 2);
    }

    #[tokio::test]
    async fn test_plain_text_is_escaped_and_unmarked() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;
        let project = indexer.begin_project("p").await.unwrap();
        let file = indexer.begin_file(&project, "a.cs", 1, 10).await.unwrap();

        indexer.index_token(&file, Token::new("Text", "a < b")).await.unwrap();
        indexer.index_token(&file, Token::new("", " & c")).await.unwrap();
        indexer.end_file(&file).await.unwrap();

        let content = fixture.db.find_file("p/a.cs").unwrap().unwrap().content.unwrap();
        assert!(content.contains("<pre id='code'>a &lt; b &amp; c</pre>"));
    }

    #[tokio::test]
    async fn test_reindexing_project_replaces_content() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;

        let project = indexer.begin_project("src/test").await.unwrap();
        for path in ["old/a.cs", "b.cs"] {
            let file = indexer.begin_file(&project, path, 1, 1).await.unwrap();
            indexer.end_file(&file).await.unwrap();
        }
        indexer.end_project(&project).unwrap();

        let again = indexer.begin_project("src/test").await.unwrap();
        assert_eq!(again, project);
        let file = indexer.begin_file(&again, "new/c.cs", 1, 1).await.unwrap();
        indexer.end_file(&file).await.unwrap();
        indexer.end_project(&again).unwrap();

        assert!(fixture.db.find_file("src/test/old/a.cs").unwrap().is_none());
        assert!(fixture.db.find_file("src/test/b.cs").unwrap().is_none());
        assert!(fixture.db.find_file("src/test/new/c.cs").unwrap().is_some());
        assert!(fixture.db.find_folder("src/test/old").unwrap().is_none());
        assert_eq!(fixture.count("SELECT COUNT(*) FROM files"), 1);
    }

    #[tokio::test]
    async fn test_symbols_are_shared_and_kind_updates() {
        let fixture = Fixture::new();
        let csharp = ready(&fixture).await;
        let cpp = fixture.indexer("cpp");
        cpp.initialize(&BTreeMap::new()).await.unwrap();

        let project = csharp.begin_project("cs").await.unwrap();
        let file = csharp.begin_file(&project, "a.cs", 1, 1).await.unwrap();
        csharp
            .index_token(&file, Token::new("i", "Foo").declaring(TokenSymbol::new("T:Foo", "class")))
            .await
            .unwrap();
        csharp
            .index_token(&file, Token::new("i", "Foo").referencing(TokenSymbol::new("T:Foo", "struct")))
            .await
            .unwrap();
        csharp.end_file(&file).await.unwrap();
        csharp.end_project(&project).unwrap();

        let project = cpp.begin_project("cpp").await.unwrap();
        let file = cpp.begin_file(&project, "a.cpp", 1, 1).await.unwrap();
        cpp.index_token(&file, Token::new("i", "Foo").declaring(TokenSymbol::new("T:Foo", "class")))
            .await
            .unwrap();
        cpp.end_file(&file).await.unwrap();
        cpp.end_project(&project).unwrap();

        let csharp_foo = fixture.db.get_symbol(&SymbolKey::for_name("csharp:T:Foo")).unwrap().unwrap();
        assert_eq!(csharp_foo.kind, "csharp:struct");
        assert!(fixture.db.get_symbol(&SymbolKey::for_name("cpp:T:Foo")).unwrap().is_some());
        assert_eq!(fixture.count("SELECT COUNT(*) FROM symbols"), 2);
    }

    #[tokio::test]
    async fn test_collision_fails_call_but_keeps_span_and_session() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;

        // Plant a row whose key belongs to another name
        let key = SymbolKey::for_name("csharp:T:Foo");
        fixture
            .db
            .get_conn()
            .unwrap()
            .execute(
                "INSERT INTO symbols (id, name, kind) VALUES (?1, 'csharp:T:Other', 'csharp:class')",
                [&key],
            )
            .unwrap();

        let project = indexer.begin_project("p").await.unwrap();
        let file = indexer.begin_file(&project, "a.cs", 1, 1).await.unwrap();
        let token = Token::new("i", "Foo")
            .declaring(TokenSymbol::new("T:Foo", "class"))
            .referencing(TokenSymbol::new("T:Bar", "class"));
        let err = indexer.index_token(&file, token).await.unwrap_err();
        assert!(matches!(err, IndexError::Store(StoreError::SymbolCollision { .. })));

        // The reference still went through, and the declaration counter was not consumed
        indexer
            .index_token(&file, Token::new("i", "Baz").declaring(TokenSymbol::new("T:Baz", "class")))
            .await
            .unwrap();
        indexer.end_file(&file).await.unwrap();
        indexer.end_project(&project).unwrap();

        let content = fixture.db.find_file("p/a.cs").unwrap().unwrap().content.unwrap();
        assert!(content.contains("<span class='csharp-i' id='r-1'>Foo</span>"));
        assert!(content.contains("<span class='csharp-i' id='d-1'>Baz</span>"));
    }

    #[tokio::test]
    async fn test_concurrent_files_in_one_session() {
        let fixture = Fixture::new();
        let indexer = Arc::new(ready(&fixture).await);
        let project = indexer.begin_project("p").await.unwrap();

        let tasks: Vec<_> = (0..4)
            .map(|f| {
                let indexer = indexer.clone();
                let project = project.clone();
                tokio::spawn(async move {
                    let file = indexer
                        .begin_file(&project, &format!("f{}.cs", f), 1, 1)
                        .await
                        .unwrap();
                    for i in 0..10 {
                        let token = Token::new("i", "x")
                            .referencing(TokenSymbol::new(format!("T:Shared{}", i % 3), "class"));
                        indexer.index_token(&file, token).await.unwrap();
                    }
                    indexer.end_file(&file).await.unwrap();
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        indexer.end_project(&project).unwrap();

        assert_eq!(fixture.count("SELECT COUNT(*) FROM symbol_references"), 40);
        assert_eq!(fixture.count("SELECT COUNT(*) FROM symbols"), 3);
        for f in 0..4 {
            let stored = fixture.db.find_file(&format!("p/f{}.cs", f)).unwrap().unwrap();
            let seqs = fixture.db.file_sequence_ids(OccurrenceKind::Reference, stored.id).unwrap();
            assert_eq!(seqs, (1..=10).collect::<Vec<u32>>());
        }
    }

    #[tokio::test]
    async fn test_root_folder_survives() {
        let fixture = Fixture::new();
        let indexer = ready(&fixture).await;
        let project = indexer.begin_project("p").await.unwrap();
        indexer.end_project(&project).unwrap();
        assert!(fixture.db.get_folder(ROOT_FOLDER_ID).unwrap().is_some());
        assert!(indexer.idle_for() < Duration::from_secs(5));
    }
}
