use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use routes::{
    documents::{
        delete_all_documents, delete_document, get_document, get_document_pdf, ingest_document,
        list_documents, preview_pdf, rerender_document_pdf,
    },
    health::{live, ready},
};

pub mod api_state;
pub mod error;
mod routes;
pub mod view;

/// Router for the document API and the health probes.
pub fn api_routes<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    let body_limit = app_state.config.ingest_max_body_bytes;

    let probes = Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready));

    let documents = Router::new()
        .route(
            "/documents",
            post(ingest_document)
                .layer(DefaultBodyLimit::max(body_limit))
                .get(list_documents)
                .delete(delete_all_documents),
        )
        .route(
            "/documents/preview-pdf",
            post(preview_pdf).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/documents/{id}",
            get(get_document).delete(delete_document),
        )
        .route(
            "/documents/{id}/pdf",
            get(get_document_pdf).post(rerender_document_pdf),
        );

    probes.merge(documents)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use common::{
        storage::{db::SurrealDbClient, store::StorageManager},
        utils::config::{AppConfig, StorageKind},
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    const BOUNDARY: &str = "nfe-test-boundary";
    const SCENARIO_KEY: &str = "NFe35200114200166000187550010000000046550010463";

    fn nfe(number: &str, key: &str, total: &str, sender: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="{key}" versao="4.00">
      <ide><nNF>{number}</nNF><dhEmi>2024-01-15T10:00:00-03:00</dhEmi></ide>
      <emit><xNome>{sender}</xNome><CNPJ>14200166000187</CNPJ></emit>
      <dest><xNome>Cliente Final</xNome><CNPJ>11222333000181</CNPJ></dest>
      <det nItem="1"><prod><cProd>A1</cProd><xProd>Cafe</xProd><qCom>2</qCom><vUnCom>10.00</vUnCom><vProd>20.00</vProd></prod></det>
      <total><ICMSTot><vNF>{total}</vNF></ICMSTot></total>
    </infNFe>
  </NFe>
</nfeProc>"#
        )
    }

    async fn test_app() -> Router {
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", &database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.expect("init schema");

        let config = AppConfig {
            storage: StorageKind::Memory,
            surrealdb_database: database,
            ..AppConfig::default()
        };
        let state = ApiState::from_parts(Arc::new(db), config, StorageManager::in_memory());

        api_routes(&state).with_state(state)
    }

    fn upload_request(xml: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"nota.xml\"\r\n\
             Content-Type: application/xml\r\n\r\n\
             {xml}\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn ingest(app: &Router, xml: &str) -> Value {
        let response = app
            .clone()
            .oneshot(upload_request(xml))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn upload_then_duplicate_key_conflicts() {
        let app = test_app().await;

        let created = ingest(&app, &nfe("123", SCENARIO_KEY, "150.50", "Padaria")).await;
        assert_eq!(created["numero"], "123");
        assert_eq!(created["chave"], "35200114200166000187550010000000046550010463");
        assert_eq!(created["valorTotal"].as_f64(), Some(150.5));
        assert_eq!(created["pdfDisponivel"], true);
        assert!(created.get("xmlOriginal").is_none());

        let response = app
            .clone()
            .oneshot(upload_request(&nfe("999", SCENARIO_KEY, "150.50", "Padaria")))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["conflict"]["id"], created["id"]);
        assert_eq!(body["conflict"]["numero"], "123");
    }

    #[tokio::test]
    async fn malformed_upload_is_bad_request() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(upload_request("<NFe><infNFe>"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(upload_request(&nfe("5", "NFe5", "12,50", "Padaria")))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_filters_and_paginates() {
        let app = test_app().await;
        ingest(&app, &nfe("1", "NFe1", "10.00", "Padaria Central")).await;
        ingest(&app, &nfe("2", "NFe2", "200.00", "Mercado Azul")).await;
        ingest(&app, &nfe("3", "NFe3", "50.00", "Padaria do Bairro")).await;

        let response = app
            .clone()
            .oneshot(request("GET", "/documents?limit=2&page=0"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["records"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["pagination"]["currentPage"], 1);
        assert_eq!(body["pagination"]["totalPages"], 2);
        assert_eq!(body["pagination"]["totalItems"], 3);
        assert_eq!(body["pagination"]["itemsPerPage"], 2);

        let response = app
            .clone()
            .oneshot(request("GET", "/documents?search=padaria&minValue=20"))
            .await
            .expect("router response");
        let body = json_body(response).await;
        let records = body["records"].as_array().expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["numero"], "3");

        let response = app
            .oneshot(request("GET", "/documents?limit=1000"))
            .await
            .expect("router response");
        let body = json_body(response).await;
        assert_eq!(body["pagination"]["itemsPerPage"], 100);
    }

    #[tokio::test]
    async fn get_document_validates_id() {
        let app = test_app().await;
        let created = ingest(&app, &nfe("42", "NFe42", "1.00", "Padaria")).await;
        let id = created["id"].as_str().expect("id");

        let response = app
            .clone()
            .oneshot(request("GET", &format!("/documents/{id}")))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["xmlOriginal"]
            .as_str()
            .is_some_and(|xml| xml.contains("<nNF>42</nNF>")));

        let response = app
            .clone()
            .oneshot(request("GET", "/documents/not-a-uuid"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(request("GET", &format!("/documents/{}", Uuid::new_v4())))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pdf_download_sets_headers() {
        let app = test_app().await;
        let created = ingest(&app, &nfe("123", SCENARIO_KEY, "150.50", "Padaria")).await;
        let id = created["id"].as_str().expect("id");

        let response = app
            .clone()
            .oneshot(request("GET", &format!("/documents/{id}/pdf")))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "inline; filename=\"NFE-123.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert!(bytes.starts_with(b"%PDF"));

        let response = app
            .clone()
            .oneshot(request("GET", &format!("/documents/{id}/pdf?download=true")))
            .await
            .expect("router response");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"NFE-123.pdf\""
        );

        let response = app
            .oneshot(request("POST", &format!("/documents/{id}/pdf")))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_single_and_all() {
        let app = test_app().await;
        let first = ingest(&app, &nfe("1", "NFe1", "1.00", "Padaria")).await;
        ingest(&app, &nfe("2", "NFe2", "2.00", "Padaria")).await;
        let id = first["id"].as_str().expect("id");

        let response = app
            .clone()
            .oneshot(request("DELETE", &format!("/documents/{id}")))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["document"]["numero"], "1");

        let response = app
            .clone()
            .oneshot(request("DELETE", &format!("/documents/{id}")))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(request("DELETE", "/documents"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["deleted"], 1);

        let response = app
            .oneshot(request("GET", "/documents"))
            .await
            .expect("router response");
        let body = json_body(response).await;
        assert_eq!(body["pagination"]["totalItems"], 0);
    }

    #[tokio::test]
    async fn preview_renders_without_storing() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/documents/preview-pdf")
                    .header(header::CONTENT_TYPE, "application/xml")
                    .body(Body::from(nfe("8", "NFe8", "3.00", "Padaria")))
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");

        let response = app
            .clone()
            .oneshot(request("POST", "/documents/preview-pdf"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(request("GET", "/documents"))
            .await
            .expect("router response");
        let body = json_body(response).await;
        assert_eq!(body["pagination"]["totalItems"], 0);
    }

    #[tokio::test]
    async fn probes_report_ok() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(request("GET", "/live"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("GET", "/ready"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["checks"]["db"], "ok");
        assert_eq!(body["checks"]["storage"], "ok");
    }
}
