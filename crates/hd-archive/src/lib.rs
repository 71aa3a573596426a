//! Transaction client for the archive service.
//!
//! One capture opens a transaction, registers and uploads any number of
//! attachments, uploads the document body, then finalizes the draft. Every
//! call after `open` carries the transaction id and the API key.

pub mod endpoint;
pub mod memory;
mod wire;

use crate::endpoint::ArchiveEndpoint;
use crate::wire::AttachmentBody;
use crate::wire::OkBody;
use crate::wire::OpenBody;
use crate::wire::WhoAmIBody;
use crate::wire::WireId;
use crate::wire::decode;
use hd_core::HoardError;
use hd_core::HoardResult;
use hd_net::multipart::MultipartForm;

pub use crate::endpoint::HttpArchiveEndpoint;
pub use crate::memory::InMemoryArchive;

/// Fixed size of every upload chunk.
pub const UPLOAD_CHUNK_SIZE: usize = 512_000;

/// Path segment under which the service serves attachments.
pub const ATTACHMENT_PATH_PREFIX: &str = "att/";

pub const DEFAULT_LOG_MESSAGE: &str = "Saved page from web extension";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub txid: String,
    pub doc_id: String,
    pub page_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSlot {
    pub attachment_id: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub ok: bool,
    pub hello: Option<String>,
}

/// How a chunked upload went; rejected chunks were answered with `ok: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadSummary {
    pub chunks: usize,
    pub rejected: usize,
}

impl UploadSummary {
    pub fn is_clean(&self) -> bool {
        self.rejected == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub ok: bool,
    pub document_id: Option<String>,
}

/// Number of requests a chunked upload of `len` bytes issues.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(UPLOAD_CHUNK_SIZE).max(1)
}

/// Removes the attachment path segment from a filename referenced inside another attachment.
pub fn strip_attachment_prefix(filename: &str) -> &str {
    filename
        .strip_prefix(ATTACHMENT_PATH_PREFIX)
        .unwrap_or(filename)
}

pub struct TransactionClient<E: ArchiveEndpoint> {
    endpoint: E,
    api_key: String,
    transaction: Option<Transaction>,
}

impl<E: ArchiveEndpoint> TransactionClient<E> {
    pub fn new(endpoint: E, api_key: &str) -> Self {
        Self {
            endpoint,
            api_key: api_key.to_owned(),
            transaction: None,
        }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn into_endpoint(self) -> E {
        self.endpoint
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// Checks the API key without opening a transaction.
    pub fn whoami(&mut self) -> HoardResult<Identity> {
        let form = MultipartForm::new().text("api_key", &self.api_key);
        let body = self.endpoint.post("api/user/whoami", &form)?;
        let body: WhoAmIBody = decode("api/user/whoami", &body)?;
        Ok(Identity {
            ok: body.ok,
            hello: body.hello,
        })
    }

    pub fn open(&mut self, page_url: &str) -> HoardResult<Transaction> {
        let form = MultipartForm::new()
            .text("api_key", &self.api_key)
            .text("page_url", page_url);
        let body = self.endpoint.post("api/capture-new-doc", &form)?;
        let body: OpenBody = decode("api/capture-new-doc", &body)?;

        let (Some(doc_id), Some(txid)) = (body.id, body.txid) else {
            return Err(HoardError::new(
                "archive.protocol.open_rejected",
                format!("capture-new-doc for `{page_url}` returned no id/txid"),
            ));
        };

        let transaction = Transaction {
            txid: txid.into_string(),
            doc_id: doc_id.into_string(),
            page_url: page_url.to_owned(),
        };
        tracing::info!(txid = %transaction.txid, doc_id = %transaction.doc_id, "transaction opened");
        self.transaction = Some(transaction.clone());
        Ok(transaction)
    }

    /// Continues a transaction opened elsewhere.
    pub fn resume(&mut self, transaction: Transaction) {
        self.transaction = Some(transaction);
    }

    pub fn register_attachment(&mut self, ext: &str) -> HoardResult<AttachmentSlot> {
        let form = self.scoped_form()?.text("ext", ext);
        self.attachment_call("api/new-attachment", &form)
    }

    /// Asks the service to fetch and store a resource on the engine's behalf.
    pub fn proxy_attachment(&mut self, url: &str) -> HoardResult<AttachmentSlot> {
        let form = self.scoped_form()?.text("url", url);
        self.attachment_call("api/proxy-attachment", &form)
    }

    pub fn upload_attachment(
        &mut self,
        slot: &AttachmentSlot,
        bytes: &[u8],
    ) -> HoardResult<UploadSummary> {
        let fields = [("att_id", slot.attachment_id.as_str())];
        self.upload_chunked(
            "api/upload-attachment",
            "attachment",
            &slot.filename,
            bytes,
            &fields,
        )
    }

    pub fn download_attachment(&mut self, attachment_id: &str) -> HoardResult<Vec<u8>> {
        let form = self.scoped_form()?.text("att_id", attachment_id);
        self.endpoint.post("api/download-attachment", &form)
    }

    pub fn upload_draft(&mut self, filename: &str, html: &[u8]) -> HoardResult<UploadSummary> {
        let doc_id = self.require_transaction()?.doc_id.clone();
        let fields = [("doc_id", doc_id.as_str())];
        self.upload_chunked("api/upload-draft", "document", filename, html, &fields)
    }

    /// Commits the transaction. A response without `ok` is logged, not raised.
    pub fn finalize(
        &mut self,
        doc_title: &str,
        icon_id: Option<&str>,
        log_message: &str,
    ) -> HoardResult<FinalizeOutcome> {
        let form = self
            .scoped_form()?
            .text("doc_title", doc_title)
            .text("doc_author", "")
            .text("icon_id", icon_id.unwrap_or_default())
            .text("log_message", log_message);
        let body = self.endpoint.post("api/finalize-draft", &form)?;
        let body: OkBody = decode("api/finalize-draft", &body)?;

        if !body.ok {
            tracing::error!(txid = ?self.transaction.as_ref().map(|tx| &tx.txid), "finalize-draft was not ok");
        } else {
            tracing::info!("draft finalized");
        }

        Ok(FinalizeOutcome {
            ok: body.ok,
            document_id: body.document_id.map(WireId::into_string),
        })
    }

    /// Where the service shows a finalized document.
    pub fn view_url(&self, document_id: &str) -> String {
        let base = self.endpoint.base_url();
        let separator = if base.ends_with('/') { "" } else { "/" };
        format!("{base}{separator}documents/view/g{document_id}/")
    }

    fn require_transaction(&self) -> HoardResult<&Transaction> {
        self.transaction.as_ref().ok_or_else(|| {
            HoardError::new(
                "archive.transaction.not_open",
                "no capture transaction is open",
            )
        })
    }

    fn scoped_form(&self) -> HoardResult<MultipartForm> {
        let transaction = self.require_transaction()?;
        Ok(MultipartForm::new()
            .text("txid", &transaction.txid)
            .text("api_key", &self.api_key))
    }

    fn attachment_call(&mut self, endpoint: &str, form: &MultipartForm) -> HoardResult<AttachmentSlot> {
        let body = self.endpoint.post(endpoint, form)?;
        let body: AttachmentBody = decode(endpoint, &body)?;

        match (body.attachment_id, body.filename) {
            (Some(id), Some(filename)) if !filename.is_empty() => {
                let slot = AttachmentSlot {
                    attachment_id: id.into_string(),
                    filename,
                };
                tracing::debug!(endpoint, filename = %slot.filename, "attachment slot issued");
                Ok(slot)
            }
            _ => {
                tracing::error!(endpoint, "attachment response lacks id or filename");
                Err(HoardError::new(
                    "archive.protocol.attachment_rejected",
                    format!("`{endpoint}` returned no attachment id or filename"),
                ))
            }
        }
    }

    /// Sends `bytes` in fixed-size chunks. The first request always goes out,
    /// even for empty content, and carries `truncate=1`.
    fn upload_chunked(
        &mut self,
        endpoint: &str,
        file_field: &str,
        filename: &str,
        bytes: &[u8],
        fields: &[(&str, &str)],
    ) -> HoardResult<UploadSummary> {
        let mut summary = UploadSummary::default();
        let mut offset = 0_usize;

        loop {
            let end = offset.saturating_add(UPLOAD_CHUNK_SIZE).min(bytes.len());

            let mut form = MultipartForm::new();
            if offset == 0 {
                form = form.text("truncate", "1");
            }
            let transaction = self.require_transaction()?;
            form = form
                .text("txid", &transaction.txid)
                .text("api_key", &self.api_key);
            for (name, value) in fields {
                form = form.text(name, value);
            }
            form = form.file(
                file_field,
                filename,
                "application/octet-stream",
                bytes[offset..end].to_vec(),
            );

            let body = self.endpoint.post(endpoint, &form)?;
            let body: OkBody = decode(endpoint, &body)?;
            summary.chunks += 1;
            if !body.ok {
                summary.rejected += 1;
                tracing::error!(endpoint, offset, "upload chunk was not accepted");
            }

            offset = end;
            if offset >= bytes.len() {
                break;
            }
        }

        tracing::debug!(endpoint, filename, chunks = summary.chunks, "upload finished");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::AttachmentSlot;
    use super::InMemoryArchive;
    use super::TransactionClient;
    use super::UPLOAD_CHUNK_SIZE;
    use super::chunk_count;
    use super::strip_attachment_prefix;
    use crate::endpoint::ArchiveEndpoint;
    use hd_core::HoardResult;
    use hd_net::multipart::MultipartForm;

    fn opened(archive: InMemoryArchive) -> TransactionClient<InMemoryArchive> {
        let mut client = TransactionClient::new(archive, "0123456789abcdef0123456789abcdef");
        let opened = client.open("https://example.com/page");
        assert!(opened.is_ok());
        client
    }

    fn slot(client: &mut TransactionClient<InMemoryArchive>, ext: &str) -> AttachmentSlot {
        match client.register_attachment(ext) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Answers every post with the same body.
    struct Scripted(&'static [u8]);

    impl ArchiveEndpoint for Scripted {
        fn post(&mut self, _endpoint: &str, _form: &MultipartForm) -> HoardResult<Vec<u8>> {
            Ok(self.0.to_vec())
        }

        fn base_url(&self) -> &str {
            "https://hoard.example/"
        }
    }

    #[test]
    fn chunk_count_has_a_floor_of_one() {
        assert_eq!(chunk_count(0), 1);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(UPLOAD_CHUNK_SIZE), 1);
        assert_eq!(chunk_count(UPLOAD_CHUNK_SIZE + 1), 2);
        assert_eq!(chunk_count(UPLOAD_CHUNK_SIZE * 5 / 2), 3);
    }

    #[test]
    fn calls_before_open_are_rejected() {
        let mut client = TransactionClient::new(InMemoryArchive::default(), "key");
        let registered = client.register_attachment("png");
        assert!(matches!(registered, Err(ref error) if error.code == "archive.transaction.not_open"));
        assert!(client.endpoint().calls().is_empty());
    }

    #[test]
    fn chunked_upload_reconstructs_payload_and_truncates_once() {
        let mut client = opened(InMemoryArchive::default());
        let slot = slot(&mut client, "png");
        let payload: Vec<u8> = (0..(UPLOAD_CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();

        let summary = client.upload_attachment(&slot, &payload);
        assert!(summary.is_ok());
        let summary = match summary {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(summary.chunks, 3);
        assert!(summary.is_clean());

        let archive = client.endpoint();
        let uploads = archive.calls_to("api/upload-attachment");
        assert_eq!(uploads.len(), 3);
        let truncated: Vec<bool> = uploads
            .iter()
            .map(|call| call.form.text_value("truncate") == Some("1"))
            .collect();
        assert_eq!(truncated, vec![true, false, false]);
        assert!(uploads.iter().all(|call| call.form.text_value("att_id") == Some(slot.attachment_id.as_str())));

        let stored = archive.attachment(&slot.filename);
        assert_eq!(stored.map(|attachment| attachment.bytes.clone()), Some(payload));
    }

    #[test]
    fn empty_payload_still_issues_one_request() {
        let mut client = opened(InMemoryArchive::default());
        let summary = client.upload_draft("Empty.html", b"");
        assert_eq!(summary.map(|value| value.chunks), Ok(1));

        let uploads = client.endpoint().calls_to("api/upload-draft");
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].form.file_bytes("document"), Some(&b""[..]));
        assert_eq!(uploads[0].form.text_value("truncate"), Some("1"));
    }

    #[test]
    fn rejected_chunks_are_counted_not_raised() {
        let mut client = TransactionClient::new(Scripted(br#"{"ok":false}"#), "key");
        client.resume(super::Transaction {
            txid: "t".to_owned(),
            doc_id: "d".to_owned(),
            page_url: "https://example.com/".to_owned(),
        });
        let summary = client.upload_draft("Doc.html", &vec![b'x'; UPLOAD_CHUNK_SIZE + 1]);
        assert_eq!(
            summary,
            Ok(super::UploadSummary {
                chunks: 2,
                rejected: 2
            })
        );
    }

    #[test]
    fn open_without_ids_is_a_protocol_error() {
        let mut client = TransactionClient::new(Scripted(br#"{"error":"bad key"}"#), "key");
        let opened = client.open("https://example.com/");
        assert!(matches!(opened, Err(ref error) if error.code == "archive.protocol.open_rejected"));
        assert!(client.transaction().is_none());
    }

    #[test]
    fn proxied_bytes_download_back() {
        let archive = InMemoryArchive::default().with_proxy_source("https://cdn.example/site.css", b"a{}");
        let mut client = opened(archive);
        let slot = client.proxy_attachment("https://cdn.example/site.css");
        assert!(slot.is_ok());
        let slot = match slot {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(slot.filename.ends_with(".css"));
        assert_eq!(client.download_attachment(&slot.attachment_id), Ok(b"a{}".to_vec()));
    }

    #[test]
    fn finalize_reports_document_and_view_url() {
        let mut client = opened(InMemoryArchive::new("https://hoard.example"));
        let doc_id = client.transaction().map(|tx| tx.doc_id.clone()).unwrap_or_default();

        let outcome = client.finalize("Title", Some("a0000000003"), super::DEFAULT_LOG_MESSAGE);
        assert!(outcome.is_ok());
        let outcome = match outcome {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(outcome.ok);
        assert_eq!(outcome.document_id.as_deref(), Some(doc_id.as_str()));
        assert_eq!(
            client.view_url(&doc_id),
            format!("https://hoard.example/documents/view/g{doc_id}/")
        );

        let finalized = client.endpoint().finalized().cloned();
        assert_eq!(finalized.map(|draft| draft.log_message), Some("Saved page from web extension".to_owned()));
    }

    #[test]
    fn whoami_reports_greeting() {
        let mut client = TransactionClient::new(InMemoryArchive::default(), "key");
        let identity = client.whoami();
        assert!(matches!(identity, Ok(ref who) if who.ok && who.hello.as_deref() == Some("archivist")));
    }

    #[test]
    fn prefix_is_stripped_only_at_the_start() {
        assert_eq!(strip_attachment_prefix("att/a01.png"), "a01.png");
        assert_eq!(strip_attachment_prefix("a01.png"), "a01.png");
        assert_eq!(strip_attachment_prefix("x/att/a01.png"), "x/att/a01.png");
    }
}
