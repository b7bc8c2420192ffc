use anyhow::{Context as _, anyhow};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use gatepass_domain::assignment::Assignment;
use gatepass_domain::id::{AccessCode, UserId};

use crate::domain::repository::{CodePoolStore, TokenSource};
use crate::domain::types::{ClaimOutcome, CodeCandidate, CreateOutcome};
use crate::error::BotError;

const USED_FIELD: &str = "used";
const CODE_FIELD: &str = "code";
const CODE_SENT_FIELD: &str = "codeSent";

/// Code pool and assignments stored in Firestore, accessed over the REST API.
///
/// Codes live in `codes_collection` keyed by the code itself, with a boolean
/// `used` field. Assignments live in `assignments_collection` keyed by the
/// decimal user id, with `code` and `codeSent` fields.
pub struct FirestoreCodePool<T> {
    client: Client,
    documents: Url,
    codes_collection: String,
    assignments_collection: String,
    tokens: T,
}

impl<T: TokenSource> FirestoreCodePool<T> {
    pub fn new(
        client: Client,
        api_base: &str,
        project_id: &str,
        codes_collection: &str,
        assignments_collection: &str,
        tokens: T,
    ) -> Result<Self, BotError> {
        let documents = Url::parse(&format!(
            "{}/projects/{}/databases/(default)/documents",
            api_base.trim_end_matches('/'),
            project_id
        ))
        .context("invalid firestore api base")?;
        Ok(Self {
            client,
            documents,
            codes_collection: codes_collection.to_owned(),
            assignments_collection: assignments_collection.to_owned(),
            tokens,
        })
    }

    fn document_url(&self, collection: &str, id: &str) -> Result<Url, BotError> {
        let mut url = self.documents.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("firestore api base cannot hold a path"))?
            .push(collection)
            .push(id);
        Ok(url)
    }

    fn assignment_url(&self, user: UserId) -> Result<Url, BotError> {
        self.document_url(&self.assignments_collection, &user.to_string())
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<Response, BotError> {
        let token = self.tokens.bearer().await?;
        Ok(request.bearer_auth(token).send().await?)
    }

    /// PATCH `url` with `fields`, returning the rejection if Firestore refused it.
    async fn patch(&self, url: Url, fields: Value) -> Result<Result<(), Rejection>, BotError> {
        let resp = self
            .authorized(self.client.patch(url).json(&json!({ "fields": fields })))
            .await?;
        if resp.status().is_success() {
            Ok(Ok(()))
        } else {
            Ok(Err(Rejection::read(resp).await))
        }
    }
}

impl<T: TokenSource> CodePoolStore for FirestoreCodePool<T> {
    async fn fetch_one_unused(&self) -> Result<Option<CodeCandidate>, BotError> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.codes_collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": USED_FIELD },
                        "op": "EQUAL",
                        "value": { "booleanValue": false },
                    }
                },
                "limit": 1,
            }
        });
        let url = format!("{}:runQuery", self.documents);
        let resp = self.authorized(self.client.post(url).json(&query)).await?;
        if !resp.status().is_success() {
            return Err(Rejection::read(resp).await.into_error());
        }

        let rows: Vec<QueryRow> = resp.json().await.context("parse runQuery response")?;
        let candidate = rows.into_iter().find_map(|row| row.document).map(|doc| {
            CodeCandidate {
                code: AccessCode::new(doc.id()),
                version: doc.update_time,
            }
        });
        Ok(candidate)
    }

    async fn mark_used(&self, candidate: &CodeCandidate) -> Result<ClaimOutcome, BotError> {
        let mut url = self.document_url(&self.codes_collection, candidate.code.as_str())?;
        let document_path = format!("/{}/{}", self.codes_collection, candidate.code);
        url.query_pairs_mut()
            .append_pair("updateMask.fieldPaths", USED_FIELD)
            .append_pair("currentDocument.updateTime", &candidate.version);

        match self
            .patch(url, json!({ USED_FIELD: { "booleanValue": true } }))
            .await?
        {
            Ok(()) => Ok(ClaimOutcome::Claimed),
            Err(rejection)
                if rejection.is_conflict() || rejection.is_missing_document(&document_path) =>
            {
                debug!(status = %rejection.status, "conditional mark lost the race");
                Ok(ClaimOutcome::Conflict)
            }
            Err(rejection) => Err(rejection.into_error()),
        }
    }

    async fn get_assignment(&self, user: UserId) -> Result<Option<Assignment>, BotError> {
        let url = self.assignment_url(user)?;
        let resp = self.authorized(self.client.get(url)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Rejection::read(resp).await.into_error());
        }

        let doc: Document = resp.json().await.context("parse assignment document")?;
        let code = doc
            .fields
            .get(CODE_FIELD)
            .and_then(|v| v.get("stringValue"))
            .and_then(Value::as_str)
            .map(AccessCode::new);
        let sent = doc
            .fields
            .get(CODE_SENT_FIELD)
            .and_then(|v| v.get("booleanValue"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Some(Assignment { code, sent }))
    }

    async fn create_assignment(
        &self,
        user: UserId,
        code: &AccessCode,
    ) -> Result<CreateOutcome, BotError> {
        let mut url = self.assignment_url(user)?;
        with_assignment_mask(&mut url);
        url.query_pairs_mut()
            .append_pair("currentDocument.exists", "false");

        match self
            .patch(url, assignment_fields(&Assignment::reserved(code.clone())))
            .await?
        {
            Ok(()) => Ok(CreateOutcome::Created),
            Err(rejection) if rejection.is_conflict() => Ok(CreateOutcome::AlreadyExists),
            Err(rejection) => Err(rejection.into_error()),
        }
    }

    async fn upsert_assignment(
        &self,
        user: UserId,
        assignment: &Assignment,
    ) -> Result<(), BotError> {
        let mut url = self.assignment_url(user)?;
        with_assignment_mask(&mut url);
        self.patch(url, assignment_fields(assignment))
            .await?
            .map_err(Rejection::into_error)
    }

    async fn delete_assignment(&self, user: UserId) -> Result<(), BotError> {
        let url = self.assignment_url(user)?;
        let resp = self.authorized(self.client.delete(url)).await?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Rejection::read(resp).await.into_error())
    }
}

/// Restrict an assignment write to the fields this service owns.
fn with_assignment_mask(url: &mut Url) {
    url.query_pairs_mut()
        .append_pair("updateMask.fieldPaths", CODE_FIELD)
        .append_pair("updateMask.fieldPaths", CODE_SENT_FIELD);
}

fn assignment_fields(assignment: &Assignment) -> Value {
    let mut fields = Map::new();
    if let Some(code) = assignment.code() {
        fields.insert(CODE_FIELD.to_owned(), json!({ "stringValue": code.as_str() }));
    }
    fields.insert(
        CODE_SENT_FIELD.to_owned(),
        json!({ "booleanValue": assignment.sent }),
    );
    Value::Object(fields)
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct QueryRow {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    update_time: String,
}

impl Document {
    /// Last path segment of the resource name.
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// A non-success Firestore response.
#[derive(Debug)]
struct Rejection {
    http: u16,
    status: String,
    message: String,
}

impl Rejection {
    async fn read(resp: Response) -> Self {
        let http = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Self {
                http,
                status: body.error.status,
                message: body.error.message,
            },
            Err(_) => Self {
                http,
                status: String::new(),
                message: text,
            },
        }
    }

    /// The write precondition did not hold.
    fn is_conflict(&self) -> bool {
        matches!(
            self.status.as_str(),
            "FAILED_PRECONDITION" | "ALREADY_EXISTS" | "ABORTED"
        ) || matches!(self.http, 409 | 412)
    }

    /// A 404 about this very document, as opposed to a wrong project or database.
    fn is_missing_document(&self, document_path: &str) -> bool {
        self.http == 404 && self.message.contains(document_path)
    }

    fn into_error(self) -> BotError {
        let message = if self.status.is_empty() {
            self.message
        } else {
            format!("{}: {}", self.status, self.message)
        };
        BotError::Firestore {
            status: self.http,
            message,
        }
    }
}
