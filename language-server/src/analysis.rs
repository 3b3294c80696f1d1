use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::{InitializeParams, Url, WorkspaceFolder};
use tracing::{debug, error, info};

use crate::backend::Backend;
use crate::collector;
use crate::diagnostics::compute_diagnostics;
use crate::resolver::{source_files, SourceFile};
use crate::text::Document;

impl Backend {
    pub(crate) fn update_workspace_roots(&self, params: &InitializeParams) {
        let mut roots = Vec::new();

        if let Some(root_uri) = params.root_uri.as_ref() {
            if let Ok(path) = root_uri.to_file_path() {
                push_root(&mut roots, path);
            }
        }

        #[allow(deprecated)]
        if let Some(root_path) = params.root_path.as_ref() {
            if !root_path.is_empty() {
                push_root(&mut roots, PathBuf::from(root_path));
            }
        }

        if let Some(folders) = params.workspace_folders.as_ref() {
            for folder in folders {
                if let Ok(path) = folder.uri.to_file_path() {
                    push_root(&mut roots, path);
                }
            }
        }

        self.replace_roots(roots);
    }

    pub(crate) fn change_workspace_folders(&self, added: &[WorkspaceFolder], removed: &[WorkspaceFolder]) {
        let mut roots = self.workspace_roots.read().clone();
        let removed: Vec<PathBuf> = removed
            .iter()
            .filter_map(|folder| folder.uri.to_file_path().ok())
            .collect();
        roots.retain(|root| !removed.contains(root));
        for folder in added {
            if let Ok(path) = folder.uri.to_file_path() {
                push_root(&mut roots, path);
            }
        }
        self.replace_roots(roots);
    }

    /// Installs a new root set. Cached tables belong to the old roots and are
    /// dropped when the set differs.
    fn replace_roots(&self, roots: Vec<PathBuf>) {
        let mut current = self.workspace_roots.write();
        if *current == roots {
            return;
        }
        debug!(?roots, "workspace roots changed");
        *current = roots;
        drop(current);

        self.symbols.clear_on_root_change();
        for entry in self.documents.iter() {
            if let Ok(uri) = Url::parse(entry.key()) {
                self.symbols
                    .replace_document(&uri, collector::extract(entry.value().text()));
            }
        }
    }

    pub(crate) fn roots(&self) -> Vec<PathBuf> {
        self.workspace_roots.read().clone()
    }

    /// Collects every workspace file that is not open in the editor. Open
    /// buffers are collected from their in-memory text instead.
    pub(crate) async fn scan_workspace(&self) {
        let roots = self.roots();
        let open: HashSet<String> = self.documents.iter().map(|entry| entry.key().clone()).collect();

        let scanned = tokio::task::spawn_blocking(move || {
            let mut tables = Vec::new();
            let mut seen = HashSet::new();
            for root in roots {
                if !root.exists() {
                    continue;
                }
                for path in source_files(&root) {
                    if !seen.insert(path.clone()) {
                        continue;
                    }
                    let Ok(uri) = Url::from_file_path(&path) else {
                        continue;
                    };
                    if open.contains(uri.as_str()) {
                        continue;
                    }
                    match std::fs::read_to_string(&path) {
                        Ok(content) => tables.push((uri, collector::extract(&content))),
                        Err(err) => debug!(path = %path.display(), %err, "skipping unreadable file"),
                    }
                }
            }
            tables
        })
        .await;

        match scanned {
            Ok(tables) => {
                let count = tables.len();
                for (uri, table) in tables {
                    if !self.documents.contains_key(uri.as_str()) {
                        self.symbols.replace_document(&uri, table);
                    }
                }
                info!(files = count, "workspace scan finished");
            }
            Err(err) => error!(%err, "workspace scan failed"),
        }
    }

    pub(crate) fn analyze_document(&self, uri: &Url, text: &str) {
        self.symbols.replace_document(uri, collector::extract(text));
        self.documents
            .insert(uri.to_string(), Document::new(text.to_string()));
    }

    /// Drops the buffer and falls back to the saved file for the symbol tables.
    pub(crate) fn forget_document(&self, uri: &Url) {
        self.documents.remove(uri.as_str());
        self.generations.remove(uri.as_str());

        let on_disk = uri
            .to_file_path()
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok());
        match on_disk {
            Some(content) => self.symbols.replace_document(uri, collector::extract(&content)),
            None => self.symbols.clear_document(uri),
        }
    }

    pub(crate) fn document_text(&self, uri: &Url) -> Option<String> {
        self.documents
            .get(uri.as_str())
            .map(|doc| doc.text().to_string())
    }

    /// Content of `path`, taken from the open buffer when there is one.
    pub(crate) fn read_source(&self, path: &Path) -> Option<String> {
        if let Ok(uri) = Url::from_file_path(path) {
            if let Some(text) = self.document_text(&uri) {
                return Some(text);
            }
        }
        std::fs::read_to_string(path).ok()
    }

    /// Text for `uri` whether or not it is open.
    pub(crate) fn source_text(&self, uri: &Url) -> Option<String> {
        match self.document_text(uri) {
            Some(text) => Some(text),
            None => uri
                .to_file_path()
                .ok()
                .and_then(|path| std::fs::read_to_string(path).ok()),
        }
    }

    /// Open buffers followed by every workspace file not open. Unreadable
    /// files are left out.
    pub(crate) fn workspace_sources(&self) -> Vec<SourceFile> {
        let mut files: Vec<SourceFile> = self
            .documents
            .iter()
            .filter_map(|entry| {
                Url::parse(entry.key()).ok().map(|uri| SourceFile {
                    uri,
                    text: entry.value().text().to_string(),
                })
            })
            .collect();
        files.sort_by(|a, b| a.uri.as_str().cmp(b.uri.as_str()));

        let mut seen: HashSet<String> = files.iter().map(|file| file.uri.to_string()).collect();
        for root in self.roots() {
            for path in source_files(&root) {
                let Ok(uri) = Url::from_file_path(&path) else {
                    continue;
                };
                if !seen.insert(uri.to_string()) {
                    continue;
                }
                if let Ok(text) = std::fs::read_to_string(&path) {
                    files.push(SourceFile { uri, text });
                }
            }
        }
        files
    }

    /// Validates `uri` once the document has been quiet for the configured
    /// debounce period. A newer edit supersedes the pending pass.
    pub(crate) fn schedule_diagnostics(&self, uri: Url) {
        let generation = {
            let mut entry = self.generations.entry(uri.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let delay = self.config.read().debounce;
        let backend = self.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = backend.generations.get(uri.as_str()).map(|entry| *entry);
            if current == Some(generation) {
                backend.publish_diagnostics(&uri).await;
            }
        });
    }

    pub(crate) async fn publish_diagnostics(&self, uri: &Url) {
        let Some(text) = self.document_text(uri) else {
            return;
        };
        let path = uri.to_file_path().ok();
        let merged = self.symbols.merged();
        let options = self.config.read().diagnostic_options();

        let diagnostics = tokio::task::spawn_blocking(move || {
            compute_diagnostics(&text, path.as_deref(), &merged, &options)
        })
        .await
        .unwrap_or_else(|err| {
            error!(uri = %uri, %err, "validation pass failed");
            Vec::new()
        });

        debug!(uri = %uri, count = diagnostics.len(), "publishing diagnostics");
        self.client
            .publish_diagnostics(uri.clone(), diagnostics, None)
            .await;
    }

    pub(crate) async fn revalidate_open_documents(&self) {
        let uris: Vec<Url> = self
            .documents
            .iter()
            .filter_map(|entry| Url::parse(entry.key()).ok())
            .collect();
        for uri in uris {
            self.publish_diagnostics(&uri).await;
        }
    }
}

fn push_root(roots: &mut Vec<PathBuf>, path: PathBuf) {
    if !roots.iter().any(|existing| existing == &path) {
        roots.push(path);
    }
}
