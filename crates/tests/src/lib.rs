//! Fixtures shared by the end-to-end scenarios: real zip archives, manifest
//! files on disk and a local HTTP server standing in for the artifact host
//! and the release API.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Result, anyhow};
use serde_json::Value;
use tiny_http::{Header, Response, Server};
use zip::ZipWriter;
use zip::write::FileOptions;

/// Zip archive holding `entries` as `(path, content)` pairs.
pub fn zip_archive(entries: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, content) in entries {
        writer.start_file(*path, FileOptions::default())?;
        writer.write_all(content.as_bytes())?;
    }
    Ok(writer.finish()?.into_inner())
}

pub fn write_manifest(dir: &Path, file_name: &str, manifest: &Value) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(file_name), serde_json::to_vec_pretty(manifest)?)?;
    Ok(())
}

/// One canned response.
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Route {
    pub fn zip(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/zip",
            body,
        }
    }

    pub fn json(value: &Value) -> Result<Self> {
        Ok(Self {
            status: 200,
            content_type: "application/json",
            body: serde_json::to_vec(value)?,
        })
    }
}

/// Local server answering fixed paths and 404 for anything else.
pub struct StaticServer {
    pub addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
}

impl StaticServer {
    /// `None` when the sandbox forbids binding a local port.
    pub fn start(routes: HashMap<String, Route>) -> Result<Option<Self>> {
        Self::start_with(|_| Ok(routes))
    }

    /// Like [`StaticServer::start`], for routes whose bodies mention the
    /// server's own address.
    pub fn start_with<F>(routes: F) -> Result<Option<Self>>
    where
        F: FnOnce(SocketAddr) -> Result<HashMap<String, Route>>,
    {
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                eprintln!("skipping end-to-end test: {err}");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let addr = listener.local_addr()?;
        let routes = routes(addr)?;
        let server =
            Server::from_listener(listener, None).map_err(|err| anyhow!("server error: {err}"))?;
        let hits = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&hits);
        thread::spawn(move || {
            while let Ok(request) = server.recv() {
                let path = request.url().to_string();
                if let Ok(mut seen) = seen.lock() {
                    seen.push(path.clone());
                }
                let response = match routes.get(&path) {
                    Some(route) => {
                        let mut response =
                            Response::from_data(route.body.clone()).with_status_code(route.status);
                        if let Ok(header) =
                            Header::from_bytes(&b"Content-Type"[..], route.content_type.as_bytes())
                        {
                            response = response.with_header(header);
                        }
                        response
                    }
                    None => Response::from_data(b"not found".to_vec()).with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        Ok(Some(Self { addr, hits }))
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Paths requested so far, in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().map(|hits| hits.clone()).unwrap_or_default()
    }
}
