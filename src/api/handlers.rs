use super::{files::FileStore, store::{DataStore, Record}, ApiConfig};
use crate::{
    errors::ApiError,
    http::{query::decode_str, request::Request, response::Response, types::StatusCode},
    router::{PathParams, Router},
};
use serde_json::{json, Value};
use std::{fs, io, path::PathBuf, sync::Arc};
use tracing::{debug, warn};

struct Api {
    data: DataStore,
    files: FileStore,
    client_page: PathBuf,
}

type Endpoint = fn(&Api, &Request, &PathParams, &mut Response) -> Result<(), ApiError>;

/// Builds the router with every built-in route, in this order:
///
/// | Method   | Template                          |
/// |----------|-----------------------------------|
/// | `POST`   | `/api/data/{collection}`          |
/// | `GET`    | `/api/data/{collection}/{id}`     |
/// | `GET`    | `/api/data/{collection}`          |
/// | `PUT`    | `/api/data/{collection}/{id}`     |
/// | `DELETE` | `/api/data/{collection}/{id}`     |
/// | `POST`   | `/api/files/upload`               |
/// | `GET`    | `/api/files/download/{filename}`  |
/// | `GET`    | `/api/files`                      |
/// | `GET`    | `/`                               |
///
/// More routes can be appended with [`Router::route`].
pub fn router(config: ApiConfig) -> Router {
    let api = Arc::new(Api {
        data: DataStore::new(),
        files: FileStore::new(config.upload_dir),
        client_page: config.client_page,
    });

    #[rustfmt::skip]
    let routes: [(&str, &str, Endpoint); 9] = [
        ("POST",   "/api/data/{collection}",         Api::create),
        ("GET",    "/api/data/{collection}/{id}",    Api::read),
        ("GET",    "/api/data/{collection}",         Api::read_all),
        ("PUT",    "/api/data/{collection}/{id}",    Api::update),
        ("DELETE", "/api/data/{collection}/{id}",    Api::delete),
        ("POST",   "/api/files/upload",              Api::upload),
        ("GET",    "/api/files/download/{filename}", Api::download),
        ("GET",    "/api/files",                     Api::list),
        ("GET",    "/",                              Api::client_page),
    ];

    routes
        .into_iter()
        .fold(Router::new(), |router, (method, template, endpoint)| {
            let api = api.clone();
            router.route(method, template, move |req: &Request, params: &PathParams, resp: &mut Response| {
                if let Err(err) = endpoint(&api, req, params, resp) {
                    debug!(%err, path = req.path(), "request failed");
                    err.write_to(resp);
                }
            })
        })
}

// Records
impl Api {
    fn create(&self, req: &Request, params: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        let record = payload(req)?;
        let id = self.data.create(&params["collection"], record);

        resp.json(StatusCode::Created, &json!({ "id": id, "status": "created" }));
        Ok(())
    }

    fn read(&self, _: &Request, params: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        let record = self
            .data
            .read(&params["collection"], &params["id"])
            .ok_or(ApiError::NotFound("Item not found"))?;

        resp.json(StatusCode::Ok, &record);
        Ok(())
    }

    fn read_all(&self, _: &Request, params: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        resp.json(StatusCode::Ok, &self.data.read_all(&params["collection"]));
        Ok(())
    }

    fn update(&self, req: &Request, params: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        let record = payload(req)?;
        let id = &params["id"];

        if !self.data.update(&params["collection"], id, record) {
            return Err(ApiError::NotFound("Item not found"));
        }

        resp.json(StatusCode::Ok, &json!({ "id": id, "status": "updated" }));
        Ok(())
    }

    fn delete(&self, _: &Request, params: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        let id = &params["id"];

        if !self.data.remove(&params["collection"], id) {
            return Err(ApiError::NotFound("Item not found"));
        }

        resp.json(StatusCode::Ok, &json!({ "id": id, "status": "deleted" }));
        Ok(())
    }
}

// Files
impl Api {
    fn upload(&self, req: &Request, _: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        if req.files().is_empty() {
            return Err(ApiError::BadRequest(match req.form().is_empty() {
                true => format!(
                    "No files or form data found. Content-Type: {}, Body size: {}",
                    req.header("Content-Type").unwrap_or("missing"),
                    req.body().len()
                ),
                false => "No files uploaded".into(),
            }));
        }

        let mut parts: Vec<_> = req.files().iter().collect();
        parts.sort_by(|a, b| a.0.cmp(b.0));

        let mut uploaded = Vec::with_capacity(parts.len());
        for (field, part) in parts {
            match self.files.save(&part.filename, &part.data) {
                Ok(name) => uploaded.push(json!({ "filename": name, "status": "uploaded" })),
                Err(err) => warn!(%err, %field, filename = %part.filename, "upload skipped"),
            }
        }

        resp.json(StatusCode::Created, &json!({ "uploaded_files": uploaded }));
        Ok(())
    }

    fn download(&self, _: &Request, params: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        let name = decode_str(params["filename"].as_bytes());
        let data = self.files.load(&name)?;

        resp.file(&name, data);
        Ok(())
    }

    fn list(&self, _: &Request, _: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        resp.json(StatusCode::Ok, &json!({ "files": self.files.list()? }));
        Ok(())
    }

    fn client_page(&self, _: &Request, _: &PathParams, resp: &mut Response) -> Result<(), ApiError> {
        let data = fs::read(&self.client_page).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ApiError::NotFound("File not found"),
            _ => err.into(),
        })?;

        let name = self
            .client_page
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        resp.file(&name, data);
        Ok(())
    }
}

/// Fields for create/update: form fields when the body had any, otherwise a
/// JSON object. An empty body gives an empty record.
fn payload(req: &Request) -> Result<Record, ApiError> {
    if !req.form().is_empty() {
        return Ok(req.form().iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    }

    if req.body().iter().all(u8::is_ascii_whitespace) {
        return Ok(Record::new());
    }

    let object: serde_json::Map<String, Value> = serde_json::from_slice(req.body())
        .map_err(|err| ApiError::BadRequest(format!("Invalid JSON body: {err}")))?;

    Ok(object
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect())
}
