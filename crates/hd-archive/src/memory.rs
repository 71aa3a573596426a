//! Archive service held in memory, for dry runs and tests.

use crate::endpoint::ArchiveEndpoint;
use hd_core::HoardError;
use hd_core::HoardResult;
use hd_net::multipart::MultipartForm;
use serde_json::json;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub endpoint: String,
    pub form: MultipartForm,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredAttachment {
    pub filename: String,
    pub source_url: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedDraft {
    pub txid: String,
    pub doc_title: String,
    pub icon_id: String,
    pub log_message: String,
}

/// Implements the archive HTTP contract against in-process maps.
///
/// Attachment filenames follow the service convention `att/a<hex id>.<ext>`.
#[derive(Debug, Clone)]
pub struct InMemoryArchive {
    base_url: String,
    next_id: u64,
    calls: Vec<RecordedCall>,
    attachments: BTreeMap<String, StoredAttachment>,
    documents: BTreeMap<String, Vec<u8>>,
    transactions: BTreeMap<String, String>,
    proxy_sources: BTreeMap<String, Vec<u8>>,
    failing: BTreeSet<String>,
    finalized: Option<FinalizedDraft>,
}

impl Default for InMemoryArchive {
    fn default() -> Self {
        Self::new("http://archive.invalid/")
    }
}

impl InMemoryArchive {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_owned(),
            next_id: 0,
            calls: Vec::new(),
            attachments: BTreeMap::new(),
            documents: BTreeMap::new(),
            transactions: BTreeMap::new(),
            proxy_sources: BTreeMap::new(),
            failing: BTreeSet::new(),
            finalized: None,
        }
    }

    /// Bytes the service will find when it proxies `url`.
    pub fn with_proxy_source(mut self, url: &str, bytes: &[u8]) -> Self {
        self.proxy_sources.insert(url.to_owned(), bytes.to_vec());
        self
    }

    /// Makes every post to `endpoint` fail with a server error.
    pub fn failing(mut self, endpoint: &str) -> Self {
        self.failing.insert(endpoint.to_owned());
        self
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    pub fn calls_to(&self, endpoint: &str) -> Vec<&RecordedCall> {
        self.calls
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .collect()
    }

    pub fn attachment(&self, filename: &str) -> Option<&StoredAttachment> {
        self.attachments
            .values()
            .find(|attachment| attachment.filename == filename)
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    pub fn document(&self, doc_id: &str) -> Option<&[u8]> {
        self.documents.get(doc_id).map(Vec::as_slice)
    }

    pub fn finalized(&self) -> Option<&FinalizedDraft> {
        self.finalized.as_ref()
    }

    fn issue_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:010x}", self.next_id)
    }

    fn new_attachment(&mut self, ext: &str, source_url: Option<String>, bytes: Vec<u8>) -> String {
        let id = self.issue_id();
        let filename = format!("att/a{id}.{ext}");
        self.attachments.insert(
            id.clone(),
            StoredAttachment {
                filename,
                source_url,
                bytes,
            },
        );
        id
    }

    fn attachment_reply(&self, id: &str) -> Vec<u8> {
        let filename = self
            .attachments
            .get(id)
            .map(|attachment| attachment.filename.clone())
            .unwrap_or_default();
        json!({ "attachment_id": id, "filename": filename })
            .to_string()
            .into_bytes()
    }
}

fn field<'a>(form: &'a MultipartForm, name: &str) -> HoardResult<&'a str> {
    form.text_value(name).ok_or_else(|| {
        HoardError::new(
            "archive.http.status",
            format!("400: missing form field `{name}`"),
        )
    })
}

fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => "bin".to_owned(),
    }
}

fn append_chunk(target: &mut Vec<u8>, form: &MultipartForm, file_field: &str) -> HoardResult<()> {
    let chunk = form.file_bytes(file_field).ok_or_else(|| {
        HoardError::new(
            "archive.http.status",
            format!("400: missing file field `{file_field}`"),
        )
    })?;
    if form.text_value("truncate") == Some("1") {
        target.clear();
    }
    target.extend_from_slice(chunk);
    Ok(())
}

impl ArchiveEndpoint for InMemoryArchive {
    fn post(&mut self, endpoint: &str, form: &MultipartForm) -> HoardResult<Vec<u8>> {
        self.calls.push(RecordedCall {
            endpoint: endpoint.to_owned(),
            form: form.clone(),
        });

        if self.failing.contains(endpoint) {
            return Err(HoardError::new(
                "archive.http.status",
                format!("`{endpoint}` answered 500: simulated failure"),
            ));
        }

        let ok = json!({ "ok": true }).to_string().into_bytes();
        match endpoint {
            "api/user/whoami" => {
                let known = form.text_value("api_key").is_some_and(|key| !key.is_empty());
                Ok(json!({ "ok": known, "hello": "archivist" })
                    .to_string()
                    .into_bytes())
            }
            "api/capture-new-doc" => {
                field(form, "page_url")?;
                let doc_id = self.issue_id();
                let txid = format!("tx{}", self.issue_id());
                self.documents.insert(doc_id.clone(), Vec::new());
                self.transactions.insert(txid.clone(), doc_id.clone());
                Ok(json!({ "id": doc_id, "txid": txid }).to_string().into_bytes())
            }
            "api/new-attachment" => {
                field(form, "txid")?;
                let ext = field(form, "ext")?.to_owned();
                let id = self.new_attachment(&ext, None, Vec::new());
                Ok(self.attachment_reply(&id))
            }
            "api/proxy-attachment" => {
                field(form, "txid")?;
                let url = field(form, "url")?.to_owned();
                let bytes = self.proxy_sources.get(&url).cloned().unwrap_or_default();
                let id = self.new_attachment(&extension_of(&url), Some(url), bytes);
                Ok(self.attachment_reply(&id))
            }
            "api/upload-attachment" => {
                let id = field(form, "att_id")?.to_owned();
                let attachment = self.attachments.get_mut(&id).ok_or_else(|| {
                    HoardError::new("archive.http.status", format!("404: no attachment `{id}`"))
                })?;
                append_chunk(&mut attachment.bytes, form, "attachment")?;
                Ok(ok)
            }
            "api/download-attachment" => {
                let id = field(form, "att_id")?;
                self.attachments
                    .get(id)
                    .map(|attachment| attachment.bytes.clone())
                    .ok_or_else(|| {
                        HoardError::new("archive.http.status", format!("404: no attachment `{id}`"))
                    })
            }
            "api/upload-draft" => {
                let doc_id = field(form, "doc_id")?.to_owned();
                let document = self.documents.entry(doc_id).or_default();
                append_chunk(document, form, "document")?;
                Ok(ok)
            }
            "api/finalize-draft" => {
                let txid = field(form, "txid")?.to_owned();
                let doc_id = self.transactions.get(&txid).cloned().ok_or_else(|| {
                    HoardError::new("archive.http.status", format!("404: no transaction `{txid}`"))
                })?;
                self.finalized = Some(FinalizedDraft {
                    txid,
                    doc_title: form.text_value("doc_title").unwrap_or_default().to_owned(),
                    icon_id: form.text_value("icon_id").unwrap_or_default().to_owned(),
                    log_message: form.text_value("log_message").unwrap_or_default().to_owned(),
                });
                Ok(json!({ "ok": true, "document_id": doc_id })
                    .to_string()
                    .into_bytes())
            }
            other => Err(HoardError::new(
                "archive.http.status",
                format!("404: unknown endpoint `{other}`"),
            )),
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
