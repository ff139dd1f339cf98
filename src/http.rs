//! HTTP adapters for the hosted endpoint and the job gateway.
//!
//! The endpoint accepts `text/csv` rows and answers with comma- or
//! newline-separated predictions. The gateway speaks JSON:
//!
//! - `POST {base}/training-jobs` with a `TrainingJobRequest`, answered by `{"job_name": ...}`
//! - `GET {base}/training-jobs/{name}` answered by a `JobDescription`
//! - `POST {base}/transform-jobs` and `GET {base}/transform-jobs/{name}` likewise

use std::io::Read;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::http::{
    CONNECT_TIMEOUT, MAX_RESPONSE_BYTES, READ_TIMEOUT, TRAINING_JOBS_ROUTE, TRANSFORM_JOBS_ROUTE,
    WRITE_TIMEOUT,
};
use crate::constants::inference::CSV_CONTENT_TYPE;
use crate::errors::PipelineError;
use crate::inference::{PredictionEndpoint, TransformJobRequest, TransformService};
use crate::poll::JobDescription;
use crate::training::{TrainingJobRequest, TrainingService};
use crate::types::{CsvPayload, JobName};

/// Shared agent with consistent timeouts.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .build()
    })
}

/// Read a response body as UTF-8, refusing bodies over `max_bytes`.
pub(crate) fn read_body_limited(
    response: ureq::Response,
    max_bytes: usize,
) -> Result<String, String> {
    if let Some(length) = response.header("Content-Length")
        && let Ok(length) = length.parse::<u64>()
        && length > max_bytes as u64
    {
        return Err(format!("response too large: {length} bytes"));
    }
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| err.to_string())?;
    if bytes.len() > max_bytes {
        return Err(format!("response exceeded {max_bytes} bytes"));
    }
    String::from_utf8(bytes).map_err(|err| err.to_string())
}

fn unwrap_call(
    url: &str,
    result: Result<ureq::Response, ureq::Error>,
    map: fn(String) -> PipelineError,
) -> Result<String, PipelineError> {
    match result {
        Ok(response) => read_body_limited(response, MAX_RESPONSE_BYTES).map_err(map),
        Err(ureq::Error::Status(404, _)) => Err(PipelineError::NotFound {
            uri: url.to_string(),
        }),
        Err(ureq::Error::Status(code, response)) => {
            let body = read_body_limited(response, MAX_RESPONSE_BYTES).unwrap_or_else(|err| err);
            Err(map(format!("HTTP {code} from {url}: {}", body.trim())))
        }
        Err(ureq::Error::Transport(err)) => Err(map(format!("{url}: {err}"))),
    }
}

/// Hosted model reachable over HTTP.
#[derive(Clone, Debug)]
pub struct HttpEndpoint {
    name: String,
    url: String,
}

impl HttpEndpoint {
    /// Endpoint `name` served at `url`.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Invocation URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PredictionEndpoint for HttpEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, payload: &str) -> Result<CsvPayload, PipelineError> {
        debug!(
            "[ltv:http] POST {} ({} bytes)",
            self.url,
            payload.len()
        );
        let result = agent()
            .post(&self.url)
            .set("Content-Type", CSV_CONTENT_TYPE)
            .set("Accept", CSV_CONTENT_TYPE)
            .send_string(payload);
        unwrap_call(&self.url, result, PipelineError::Endpoint)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CreatedJob {
    job_name: JobName,
}

/// Job gateway exposing training and transform jobs as JSON resources.
#[derive(Clone, Debug)]
pub struct HttpJobGateway {
    base_url: String,
}

impl HttpJobGateway {
    /// Gateway rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn create<T: Serialize>(&self, route: &str, request: &T) -> Result<JobName, PipelineError> {
        let url = format!("{}/{route}", self.base_url);
        debug!("[ltv:http] POST {}", url);
        let result = agent()
            .post(&url)
            .set("Accept", "application/json")
            .send_json(request);
        let body = unwrap_call(&url, result, PipelineError::JobService)?;
        let created: CreatedJob = serde_json::from_str(&body)?;
        Ok(created.job_name)
    }

    fn describe(&self, route: &str, job_name: &str) -> Result<JobDescription, PipelineError> {
        let url = format!("{}/{route}/{job_name}", self.base_url);
        debug!("[ltv:http] GET {}", url);
        let result = agent().get(&url).set("Accept", "application/json").call();
        let body = unwrap_call(&url, result, PipelineError::JobService)?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl TrainingService for HttpJobGateway {
    fn create_training_job(&self, request: &TrainingJobRequest) -> Result<JobName, PipelineError> {
        self.create(TRAINING_JOBS_ROUTE, request)
    }

    fn describe_training_job(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
        self.describe(TRAINING_JOBS_ROUTE, job_name)
    }
}

impl TransformService for HttpJobGateway {
    fn create_transform_job(&self, request: &TransformJobRequest) -> Result<JobName, PipelineError> {
        self.create(TRANSFORM_JOBS_ROUTE, request)
    }

    fn describe_transform_job(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
        self.describe(TRANSFORM_JOBS_ROUTE, job_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::JobStatus;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serve one canned response; the request line and body come back on the channel.
    fn serve_once(response: String) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                let _ = reader.read_line(&mut request_line);
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':')
                        && name.eq_ignore_ascii_case("content-length")
                    {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
                let mut body = vec![0u8; content_length];
                let _ = reader.read_exact(&mut body);
                let _ = tx.send((
                    request_line.trim().to_string(),
                    String::from_utf8_lossy(&body).into_owned(),
                ));
                let _ = reader.get_mut().write_all(response.as_bytes());
            }
        });
        (format!("http://{addr}"), rx)
    }

    fn ok(content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn endpoint_posts_csv_and_parses_predictions() {
        let (base, rx) = serve_once(ok("text/csv", "12.5,30\n"));
        let endpoint = HttpEndpoint::new("ltv", format!("{base}/invocations"));
        let body = endpoint.invoke("1,0,4.5\n0,1,9\n").unwrap();
        assert_eq!(
            crate::inference::parse_predictions(&body).unwrap(),
            vec![12.5, 30.0]
        );
        let (request_line, sent) = rx.recv().unwrap();
        assert_eq!(request_line, "POST /invocations HTTP/1.1");
        assert_eq!(sent, "1,0,4.5\n0,1,9\n");
    }

    #[test]
    fn endpoint_status_errors_carry_the_body() {
        let body = "model not loaded";
        let (base, _rx) = serve_once(format!(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ));
        let err = HttpEndpoint::new("ltv", base).invoke("1\n").unwrap_err();
        assert!(
            matches!(err, PipelineError::Endpoint(ref msg) if msg.contains("503") && msg.contains(body))
        );
    }

    #[test]
    fn gateway_describes_jobs_as_json() {
        let json = r#"{"job_name":"ltv-training-1","status":"Failed","failure_reason":"bad channel","output":null,"created_at":null,"ended_at":null}"#;
        let (base, rx) = serve_once(ok("application/json", json));
        let description = HttpJobGateway::new(format!("{base}/"))
            .describe_training_job("ltv-training-1")
            .unwrap();
        assert_eq!(description.status, JobStatus::Failed);
        assert_eq!(description.failure_reason.as_deref(), Some("bad channel"));
        let (request_line, _) = rx.recv().unwrap();
        assert_eq!(request_line, "GET /training-jobs/ltv-training-1 HTTP/1.1");
    }

    #[test]
    fn gateway_failures_are_job_service_errors() {
        let body = "throttled";
        let (base, _rx) = serve_once(format!(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ));
        let err = HttpJobGateway::new(base)
            .describe_training_job("ltv-training-1")
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::JobService(ref msg) if msg.contains("503") && msg.contains(body))
        );
    }

    #[test]
    fn gateway_maps_missing_jobs_to_not_found() {
        let (base, _rx) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
        );
        let err = HttpJobGateway::new(base)
            .describe_transform_job("missing")
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { ref uri } if uri.ends_with("/transform-jobs/missing")));
    }
}
