use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::errors::{AppError, AppResult};

use super::hashing::get_bytes_hash;
use super::types::{
    DatasetInfo, Page, PointCloudInfo, PointCloudUpload, ProjectInfo, ProjectType,
    RelatedImageInfo, RelatedImageLink,
};
use super::PointCloudApi;

const API_PREFIX: &str = "public/api/v3";
const PER_PAGE: u32 = 500;

/// HTTP client for the platform's REST API
pub struct PlatformClient {
    client: Client,
    server_address: String,
    api_token: String,
}

impl PlatformClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            server_address: config.server_address.clone(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/{}/{}", self.server_address, API_PREFIX, method)
    }

    async fn post(&self, method: &str, body: &impl Serialize) -> AppResult<Response> {
        let url = self.method_url(method);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_token)
            .json(body)
            .send()
            .await?;

        check_status(method, response).await
    }

    async fn post_json<R: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
    ) -> AppResult<R> {
        let response = self.post(method, body).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Collects every page of a paginated list method.
    async fn list_all<T: DeserializeOwned>(
        &self,
        method: &str,
        mut body: Value,
    ) -> AppResult<Vec<T>> {
        let mut entities = Vec::new();
        let mut page = 1u32;

        loop {
            body["page"] = json!(page);
            body["per_page"] = json!(PER_PAGE);

            let result: Page<T> = self.post_json(method, &body).await?;
            let received = result.entities.len();
            entities.extend(result.entities);

            let last_page = match result.pages_count {
                Some(pages) => page >= pages,
                None => (received as u32) < PER_PAGE,
            };
            if last_page {
                break;
            }
            page += 1;
        }

        Ok(entities)
    }

    async fn download_to(&self, method: &str, id: u64, path: &Path) -> AppResult<()> {
        let mut response = self.post(method, &json!({ "id": id })).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        log::debug!("Wrote {} bytes to {}", written, path.display());
        Ok(())
    }

    /// Uploads file contents addressed by hash and returns the hashes in
    /// input order.
    async fn upload_content(&self, method: &str, paths: &[PathBuf]) -> AppResult<Vec<String>> {
        let mut payload = ContentPayload::new();
        for path in paths {
            payload.add_file(path).await?;
        }

        if payload.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.method_url(method);
        log::debug!("POST {} ({} files)", url, payload.len());

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_token)
            .multipart(payload.build_form()?)
            .send()
            .await?;
        check_status(method, response).await?;

        Ok(payload.hashes())
    }
}

async fn check_status(method: &str, response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    log::warn!("Platform call {} failed with {}: {}", method, status, message);

    Err(AppError::Api {
        method: method.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl PointCloudApi for PlatformClient {
    async fn list_projects(&self, workspace_id: u64) -> AppResult<Vec<ProjectInfo>> {
        self.list_all("projects.list", json!({ "workspaceId": workspace_id }))
            .await
    }

    async fn create_project(
        &self,
        workspace_id: u64,
        name: &str,
        project_type: ProjectType,
    ) -> AppResult<ProjectInfo> {
        self.post_json(
            "projects.add",
            &json!({
                "workspaceId": workspace_id,
                "title": name,
                "description": "",
                "type": project_type,
            }),
        )
        .await
    }

    async fn create_dataset(&self, project_id: u64, name: &str) -> AppResult<DatasetInfo> {
        self.post_json(
            "datasets.add",
            &json!({
                "projectId": project_id,
                "name": name,
                "description": "",
            }),
        )
        .await
    }

    async fn upload_point_clouds(
        &self,
        dataset_id: u64,
        items: &[PointCloudUpload],
    ) -> AppResult<Vec<PointCloudInfo>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let paths: Vec<PathBuf> = items.iter().map(|item| item.path.clone()).collect();
        let hashes = self.upload_content("point-clouds.bulk.upload", &paths).await?;

        let point_clouds: Vec<Value> = items
            .iter()
            .zip(hashes)
            .map(|(item, hash)| {
                let mut entry = json!({ "name": item.name, "hash": hash });
                if let Some(meta) = &item.meta {
                    entry["meta"] = meta.clone();
                }
                entry
            })
            .collect();

        let infos: Vec<PointCloudInfo> = self
            .post_json(
                "point-clouds.bulk.add",
                &json!({ "datasetId": dataset_id, "pointClouds": point_clouds }),
            )
            .await?;

        // Response order is not guaranteed; restore input order by name.
        let mut ordered = Vec::with_capacity(items.len());
        for item in items {
            let info = infos
                .iter()
                .find(|info| info.name == item.name)
                .cloned()
                .ok_or_else(|| AppError::not_found("uploaded point cloud", &item.name))?;
            ordered.push(info);
        }
        Ok(ordered)
    }

    async fn upload_related_images(&self, paths: &[PathBuf]) -> AppResult<Vec<String>> {
        self.upload_content("images.bulk.upload", paths).await
    }

    async fn add_related_images(&self, links: &[RelatedImageLink]) -> AppResult<()> {
        if links.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .post_json("point-clouds.images.add", &json!({ "images": links }))
            .await?;
        Ok(())
    }

    async fn get_point_cloud_by_id(&self, id: u64) -> AppResult<PointCloudInfo> {
        self.post_json("point-clouds.info", &json!({ "id": id })).await
    }

    async fn list_point_clouds(&self, dataset_id: u64) -> AppResult<Vec<PointCloudInfo>> {
        self.list_all("point-clouds.list", json!({ "datasetId": dataset_id }))
            .await
    }

    async fn list_related_images(&self, point_cloud_id: u64) -> AppResult<Vec<RelatedImageInfo>> {
        self.post_json("point-clouds.images.list", &json!({ "id": point_cloud_id }))
            .await
    }

    async fn download_point_cloud(&self, id: u64, path: &Path) -> AppResult<()> {
        self.download_to("point-clouds.download", id, path).await
    }

    async fn download_related_image(&self, id: u64, path: &Path) -> AppResult<()> {
        self.download_to("images.download", id, path).await
    }

    async fn remove(&self, id: u64) -> AppResult<()> {
        let _: Value = self
            .post_json("point-clouds.remove", &json!({ "id": id }))
            .await?;
        Ok(())
    }

    async fn remove_batch(&self, ids: &[u64]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .post_json("point-clouds.bulk.remove", &json!({ "ids": ids }))
            .await?;
        Ok(())
    }
}

/// Multipart payload of files keyed by content hash
#[derive(Debug, Clone, Default)]
pub struct ContentPayload {
    files: Vec<(String, Vec<u8>, String, String)>, // (hash, data, mime_type, filename)
}

impl ContentPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub async fn add_file(&mut self, file_path: &Path) -> AppResult<()> {
        let file_contents = tokio::fs::read(file_path).await?;
        let filename = file_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let hash = get_bytes_hash(&file_contents);
        let mime_type = mime_for(file_path);

        self.files
            .push((hash, file_contents, mime_type.to_string(), filename));
        Ok(())
    }

    pub fn hashes(&self) -> Vec<String> {
        self.files.iter().map(|(hash, ..)| hash.clone()).collect()
    }

    pub fn build_form(&self) -> AppResult<multipart::Form> {
        let mut form = multipart::Form::new();

        for (hash, data, mime_type, filename) in &self.files {
            let part = multipart::Part::bytes(data.clone())
                .file_name(filename.clone())
                .mime_str(mime_type)?;

            form = form.part(hash.clone(), part);
        }

        Ok(form)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    fn test_config() -> Config {
        Config {
            server_address: "https://app.example.com".to_string(),
            api_token: "token".to_string(),
            workspace_id: Some(1),
            request_timeout_secs: 30,
        }
    }

    #[derive(Debug, Clone)]
    struct RecordedRequest {
        path: String,
        head: String,
        body: String,
    }

    /// Local HTTP server answering one request per connection with canned
    /// responses, in order. Once they run out the listener is dropped.
    struct StubServer {
        address: String,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl StubServer {
        async fn start(responses: Vec<(u16, String)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let recorded = Arc::clone(&requests);

            tokio::spawn(async move {
                for (status, body) in responses {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let request = read_request(&mut socket).await;
                    recorded.lock().unwrap().push(request);

                    let response = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.shutdown().await.unwrap();
                }
            });

            Self { address, requests }
        }

        fn client(&self) -> PlatformClient {
            let config = Config {
                server_address: self.address.clone(),
                ..test_config()
            };
            PlatformClient::new(&config).unwrap()
        }

        fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> RecordedRequest {
        let mut data = Vec::new();
        let mut buffer = [0u8; 8192];

        loop {
            let read = socket.read(&mut buffer).await.unwrap();
            assert!(read > 0, "connection closed mid-request");
            data.extend_from_slice(&buffer[..read]);

            let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&data[..header_end]).to_string();
            let body_start = header_end + 4;
            let lowered = head.to_lowercase();

            let complete_at = if lowered.contains("transfer-encoding: chunked") {
                data.ends_with(b"0\r\n\r\n").then_some(data.len())
            } else {
                let length = lowered
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                (data.len() >= body_start + length).then_some(body_start + length)
            };

            if let Some(end) = complete_at {
                let path = head.split_whitespace().nth(1).unwrap_or_default().to_string();
                let body = String::from_utf8_lossy(&data[body_start..end]).to_string();
                return RecordedRequest { path, head, body };
            }
        }
    }

    fn json_body(request: &RecordedRequest) -> Value {
        serde_json::from_str(&request.body).unwrap()
    }

    #[test]
    fn test_method_url() {
        let client = PlatformClient::new(&test_config()).unwrap();
        assert_eq!(
            client.method_url("point-clouds.info"),
            "https://app.example.com/public/api/v3/point-clouds.info"
        );
    }

    #[test]
    fn test_mime_detection() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.pcd")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_content_payload_hashes_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.png");
        let b = temp_dir.path().join("b.png");
        std::fs::write(&a, b"first").unwrap();
        std::fs::write(&b, b"second").unwrap();

        let mut payload = ContentPayload::new();
        payload.add_file(&a).await.unwrap();
        payload.add_file(&b).await.unwrap();

        assert_eq!(
            payload.hashes(),
            vec![get_bytes_hash(b"first"), get_bytes_hash(b"second")]
        );
        assert!(payload.build_form().is_ok());
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let server =
            StubServer::start(vec![(409, r#"{"error":"name already exists"}"#.to_string())]).await;

        let result = server.client().create_dataset(5, "dataset_1").await;

        match result {
            Err(AppError::Api {
                method,
                status,
                message,
            }) => {
                assert_eq!(method, "datasets.add");
                assert_eq!(status, 409);
                assert!(message.contains("name already exists"));
            }
            other => panic!("expected an API error, got {:?}", other),
        }

        let requests = server.requests();
        assert_eq!(requests[0].path, "/public/api/v3/datasets.add");
        assert!(requests[0].head.to_lowercase().contains("x-api-key: token"));
        assert_eq!(json_body(&requests[0])["projectId"], 5);
    }

    #[tokio::test]
    async fn test_list_all_follows_pages_count() {
        let server = StubServer::start(vec![
            (
                200,
                r#"{"pagesCount":2,"entities":[{"id":1,"name":"000000.pcd"}]}"#.to_string(),
            ),
            (
                200,
                r#"{"pagesCount":2,"entities":[{"id":2,"name":"000001.pcd"}]}"#.to_string(),
            ),
        ])
        .await;

        let infos = server.client().list_point_clouds(7).await.unwrap();
        let ids: Vec<u64> = infos.iter().map(|info| info.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        for (i, request) in requests.iter().enumerate() {
            let body = json_body(request);
            assert_eq!(request.path, "/public/api/v3/point-clouds.list");
            assert_eq!(body["datasetId"], 7);
            assert_eq!(body["page"], i + 1);
            assert_eq!(body["per_page"], PER_PAGE);
        }
    }

    #[tokio::test]
    async fn test_list_all_stops_on_short_page() {
        let server = StubServer::start(vec![(
            200,
            r#"{"entities":[{"id":3,"name":"Point Clouds Tutorial"}]}"#.to_string(),
        )])
        .await;

        let projects = server.client().list_projects(1).await.unwrap();

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Point Clouds Tutorial");
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_add_restores_input_order() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("000000.pcd");
        let second = temp_dir.path().join("000001.pcd");
        std::fs::write(&first, b"frame 0").unwrap();
        std::fs::write(&second, b"frame 1").unwrap();

        let server = StubServer::start(vec![
            (200, "{}".to_string()),
            (
                200,
                r#"[{"id":11,"name":"000001.pcd"},{"id":10,"name":"000000.pcd"}]"#.to_string(),
            ),
        ])
        .await;

        let items = vec![
            PointCloudUpload {
                name: "000000.pcd".to_string(),
                path: first,
                meta: None,
            },
            PointCloudUpload {
                name: "000001.pcd".to_string(),
                path: second,
                meta: Some(json!({ "frame": 1 })),
            },
        ];
        let infos = server.client().upload_point_clouds(3, &items).await.unwrap();

        let ids: Vec<u64> = infos.iter().map(|info| info.id).collect();
        assert_eq!(ids, vec![10, 11]);

        let requests = server.requests();
        assert_eq!(requests[0].path, "/public/api/v3/point-clouds.bulk.upload");
        assert_eq!(requests[1].path, "/public/api/v3/point-clouds.bulk.add");

        let body = json_body(&requests[1]);
        assert_eq!(body["datasetId"], 3);
        assert_eq!(body["pointClouds"][0]["name"], "000000.pcd");
        assert_eq!(body["pointClouds"][0]["hash"], get_bytes_hash(b"frame 0"));
        assert!(body["pointClouds"][0].get("meta").is_none());
        assert_eq!(body["pointClouds"][1]["meta"], json!({ "frame": 1 }));
    }

    #[tokio::test]
    async fn test_bulk_add_missing_entity_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("000000.pcd");
        std::fs::write(&path, b"frame 0").unwrap();

        let server = StubServer::start(vec![
            (200, "{}".to_string()),
            (200, r#"[{"id":10,"name":"other.pcd"}]"#.to_string()),
        ])
        .await;

        let items = vec![PointCloudUpload {
            name: "000000.pcd".to_string(),
            path,
            meta: None,
        }];
        let result = server.client().upload_point_clouds(3, &items).await;

        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }
}
