//! Job round trips against a scripted Envia API

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use chrono::{NaiveDate, Utc};
    use nms_core::{
        ContractId, EnviaOrderDocumentId, ModemId, PhonenumberId, ServiceConfig,
    };
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Arc;

    use crate::client::{ApiResponse, EnviaTransport};
    use crate::config::{ApiVersion, EnviaConfig};
    use crate::entities::{EnviaOrder, EnviaOrderDocument};
    use crate::error::{EnviaError, Result};
    use crate::jobs::Job;
    use crate::request::RequestParams;
    use crate::response::Outcome;
    use crate::service::ProvVoipEnvia;
    use crate::store::{MemoryProvisioningStore, ProvisioningStore, Snapshot};

    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<ApiResponse>>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        fn answer(&self, status: u16, body: &str) {
            self.responses.lock().push_back(ApiResponse {
                status,
                body: body.to_string(),
            });
        }

        fn last_request(&self) -> (String, String) {
            self.requests.lock().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl EnviaTransport for ScriptedTransport {
        async fn post(&self, url: &str, body: String) -> Result<ApiResponse> {
            self.requests.lock().push((url.to_string(), body));
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| EnviaError::UnexpectedValue("no scripted response left".to_string()))
        }
    }

    fn config(document_dir: &Path) -> EnviaConfig {
        EnviaConfig {
            service: ServiceConfig {
                service_name: "provvoip-envia".to_string(),
                http_bind: "127.0.0.1:0".to_string(),
                database_url: String::new(),
                db_pool_size: 1,
                log_level: "info".to_string(),
            },
            base_url: "https://envia.example/api/".to_string(),
            api_version: ApiVersion::new(1, 4),
            reseller_username: "reseller".to_string(),
            reseller_password: "s3cret".to_string(),
            document_dir: document_dir.to_path_buf(),
        }
    }

    fn entities() -> MemoryProvisioningStore {
        let snapshot: Snapshot = serde_json::from_value(serde_json::json!({
            "contracts": [{
                "id": 1,
                "number": "10001",
                "salutation": "Herr",
                "firstname": "Max",
                "lastname": "Mustermann",
                "street": "Hauptstraße",
                "house_number": "1",
                "zip": "09111",
                "city": "Chemnitz",
                "phonetariff_sale_next": "VOIP-BASIC",
                "phonetariff_purchase_next": "VAR-1"
            }],
            "modems": [{
                "id": 1,
                "contract_id": 1,
                "firstname": "Max",
                "lastname": "Mustermann",
                "street": "Hauptstraße",
                "house_number": "1",
                "zip": "09111",
                "city": "Chemnitz"
            }],
            "phonenumbers": [{
                "id": 1,
                "modem_id": 1,
                "prefix_number": "0371",
                "number": "123456",
                "username": "sip-user",
                "password": "sip-pass"
            }],
            "managements": [{
                "id": 1,
                "phonenumber_id": 1,
                "activation_date": "2024-06-01",
                "carrier_in": "D057",
                "trc_class": "0"
            }]
        }))
        .unwrap();

        let store = MemoryProvisioningStore::new();
        assert_eq!(store.import(snapshot), 4);
        store
    }

    fn service(
        store: &MemoryProvisioningStore,
        document_dir: &Path,
    ) -> (ProvVoipEnvia, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let envia = ProvVoipEnvia::new(
            Arc::new(config(document_dir)),
            Arc::new(store.clone()),
            transport.clone(),
        );
        (envia, transport)
    }

    fn order_params(orderid: &str) -> RequestParams {
        RequestParams {
            order_id: Some(orderid.to_string()),
            ..Default::default()
        }
    }

    async fn placed_order(store: &MemoryProvisioningStore, orderid: &str, method: &str) -> EnviaOrder {
        let mut order = EnviaOrder::new(orderid, method, Utc::now());
        order.contract_id = Some(ContractId(1));
        order.modem_id = Some(ModemId(1));
        order.phonenumber_id = Some(PhonenumberId(1));
        store.create_order(order).await.unwrap()
    }

    #[tokio::test]
    async fn test_contract_create_stores_references() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        transport.answer(
            201,
            "<response><orderid>1001</orderid>\
             <customerreference>K-77</customerreference>\
             <contractreference>V-88</contractreference></response>",
        );

        let params = RequestParams {
            modem_id: Some(ModemId(1)),
            ..Default::default()
        };
        let outcome = envia.run(Job::ContractCreate, &params).await.unwrap();

        let Outcome::OrderCreated { order } = outcome else {
            panic!("unexpected outcome");
        };
        assert_eq!(order.orderid, "1001");
        assert_eq!(order.method.as_deref(), Some("contract/create"));
        assert_eq!(order.contract_id, Some(ContractId(1)));

        let contract = store.contract(ContractId(1)).await.unwrap().unwrap();
        assert_eq!(contract.customer_external_id.as_deref(), Some("K-77"));
        let modem = store.modem(ModemId(1)).await.unwrap().unwrap();
        assert_eq!(modem.contract_external_id.as_deref(), Some("V-88"));
        assert!(modem.contract_ext_creation_date.is_some());

        let (url, body) = transport.last_request();
        assert_eq!(url, "https://envia.example/api/contract/create");
        assert!(body.contains("<contract_create>"));
        assert!(body.contains("<salutation>Herrn</salutation>"));
        assert!(body.contains("<installation_address_data>"));
        assert_eq!(envia.requests_sent(), 1);
        assert_eq!(envia.open_orders(), 1);
    }

    #[tokio::test]
    async fn test_provider_errors_are_reported() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        transport.answer(
            400,
            "<response><response_error><status>400</status>\
             <message>Validation failed</message></response_error></response>",
        );

        let params = RequestParams {
            modem_id: Some(ModemId(1)),
            ..Default::default()
        };
        let err = envia.run(Job::ContractCreate, &params).await.unwrap_err();

        match err {
            EnviaError::Provider { status, messages } => {
                assert_eq!(status, 400);
                assert_eq!(messages[0].message, "Validation failed");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(envia.requests_failed(), 1);
        assert_eq!(store.order_count(true), 0);
    }

    #[tokio::test]
    async fn test_request_xml_hides_credentials() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));

        let xml = envia.xml(Job::MiscPing, &RequestParams::default()).await.unwrap();

        assert!(xml.contains("################"));
        assert!(!xml.contains("s3cret"));
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_voip_account_activation_confirmed_by_status() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        transport.answer(201, "<response><orderid>3001</orderid></response>");
        transport.answer(
            200,
            "<response><orderid>3001</orderid><ordertype_id>7</ordertype_id>\
             <ordertype>Neuanlage VoIP-Account</ordertype>\
             <orderstatus>erfolgreich verarbeitet</orderstatus>\
             <orderdate>2024-06-03T08:15:00</orderdate></response>",
        );

        let params = RequestParams {
            phonenumber_id: Some(PhonenumberId(1)),
            ..Default::default()
        };
        envia.run(Job::VoipAccountCreate, &params).await.unwrap();
        let management = store.management_for_phonenumber(PhonenumberId(1)).await.unwrap().unwrap();
        assert!(management.voipaccount_ext_creation_date.is_some());
        assert!(management.external_activation_date.is_none());

        let outcome = envia.run(Job::OrderGetStatus, &order_params("3001")).await.unwrap();

        let Outcome::OrderStatus { order, changed } = outcome else {
            panic!("unexpected outcome");
        };
        assert!(changed);
        assert_eq!(order.ordertype_id.as_deref(), Some("7"));
        assert_eq!(order.orderdate, NaiveDate::from_ymd_opt(2024, 6, 3));

        let management = store.management_for_phonenumber(PhonenumberId(1)).await.unwrap().unwrap();
        assert_eq!(management.external_activation_date, NaiveDate::from_ymd_opt(2024, 6, 3));
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_saved() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        let order = placed_order(&store, "4001", "contract/change_tariff").await;
        transport.answer(200, "<response><orderstatus>initializing</orderstatus></response>");

        let outcome = envia.run(Job::OrderGetStatus, &order_params("4001")).await.unwrap();

        assert!(matches!(outcome, Outcome::OrderStatus { changed: false, .. }));
        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, order.updated_at);
    }

    #[tokio::test]
    async fn test_unknown_orders_are_deleted() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        let typed = placed_order(&store, "5001", "contract/relocate").await;
        let mut manual = EnviaOrder::new("5002", "", Utc::now());
        manual.ordertype = None;
        let manual = store.create_order(manual).await.unwrap();
        transport.answer(404, "<response/>");
        transport.answer(404, "<response/>");

        let soft = envia.run(Job::OrderGetStatus, &order_params("5001")).await.unwrap();
        let hard = envia.run(Job::OrderGetStatus, &order_params("5002")).await.unwrap();

        assert!(matches!(soft, Outcome::OrderDeleted { hard: false, .. }));
        assert!(matches!(hard, Outcome::OrderDeleted { hard: true, .. }));
        assert!(store.order(typed.id).await.unwrap().unwrap().is_trashed());
        assert!(store.order(manual.id).await.unwrap().is_none());
        assert_eq!(envia.requests_failed(), 0);
    }

    #[tokio::test]
    async fn test_status_of_missing_order_is_not_found() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        transport.answer(200, "<response><orderstatus>successful</orderstatus></response>");

        let err = envia.run(Job::OrderGetStatus, &order_params("999")).await.unwrap_err();

        assert_eq!(err.to_string(), "Not found: There is no order with order_id 999");
    }

    #[tokio::test]
    async fn test_failed_cancelation_restores_order() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        let original = placed_order(&store, "6001", "voip_account/terminate").await;
        transport.answer(201, "<response><orderid>6002</orderid></response>");
        transport.answer(
            200,
            "<response><orderstatus>fehlgeschlagen</orderstatus></response>",
        );

        let outcome = envia.run(Job::OrderCancel, &order_params("6001")).await.unwrap();
        let Outcome::OrderCanceled { order, canceled } = outcome else {
            panic!("unexpected outcome");
        };
        assert_eq!(canceled, "6001");
        assert_eq!(order.related_order_id.as_deref(), Some("6001"));
        assert_eq!(order.orderstatus.as_deref(), Some("in Bearbeitung"));
        assert!(store.order(original.id).await.unwrap().unwrap().is_trashed());

        envia.run(Job::OrderGetStatus, &order_params("6002")).await.unwrap();

        assert!(!store.order(original.id).await.unwrap().unwrap().is_trashed());
    }

    #[tokio::test]
    async fn test_orders_csv_import() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        placed_order(&store, "7001", "voip_account/create").await;

        let csv = "orderid,method,ordertype_id,ordertype,orderstatus,orderdate,localareacode,baseno\n\
                   7001,voip_account/create,12,Neuanlage,successful,2024-05-02,0371,123456\n\
                   7002,voip_account/update,14,Aenderung,successful,2024-05-03,0371,123456\n\
                   7003,voip_account/create,12,Neuanlage,successful,2024-05-04,030,999999\n";
        transport.answer(
            200,
            &format!("<response><data>{}</data></response>", BASE64.encode(csv)),
        );

        let outcome = envia.run(Job::MiscGetOrdersCsv, &RequestParams::default()).await.unwrap();

        let Outcome::OrdersImported { created, updated, skipped } = outcome else {
            panic!("unexpected outcome");
        };
        assert_eq!(created, vec!["7002"]);
        assert_eq!(updated, vec!["7001"]);
        assert_eq!(skipped, vec!["7003"]);

        let imported = store.order_by_orderid("7002", false).await.unwrap().unwrap();
        assert_eq!(imported.phonenumber_id, Some(PhonenumberId(1)));
        assert_eq!(imported.modem_id, Some(ModemId(1)));
        assert_eq!(imported.contract_id, Some(ContractId(1)));
        assert_eq!(imported.orderdate, NaiveDate::from_ymd_opt(2024, 5, 3));
    }

    #[tokio::test]
    async fn test_voice_data_updates_sip_credentials() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        transport.answer(
            200,
            "<response><callnumbers><callnumber_single_data>\
             <localareacode>0371</localareacode><baseno>123456</baseno><trc_class>2</trc_class>\
             <method><sip_data><username>new-user</username><password>new-pass</password>\
             <sipdomain>sip.envia.example</sipdomain></sip_data></method>\
             </callnumber_single_data></callnumbers></response>",
        );

        let params = RequestParams {
            contract_id: Some(ContractId(1)),
            modem_id: Some(ModemId(1)),
            ..Default::default()
        };
        let outcome = envia.run(Job::ContractGetVoiceData, &params).await.unwrap();

        assert!(matches!(outcome, Outcome::VoiceData { ref updated } if updated == &[PhonenumberId(1)]));
        let phonenumber = store.phonenumber(PhonenumberId(1)).await.unwrap().unwrap();
        assert_eq!(phonenumber.username.as_deref(), Some("new-user"));
        assert_eq!(phonenumber.sipdomain.as_deref(), Some("sip.envia.example"));
        let management = store.management_for_phonenumber(PhonenumberId(1)).await.unwrap().unwrap();
        assert_eq!(management.trc_class.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_free_numbers_are_sorted() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        transport.answer(
            200,
            "<response><numbers>\
             <number><localareacode>0371</localareacode><baseno>1000</baseno></number>\
             <number><localareacode>0371</localareacode><baseno>200</baseno></number>\
             </numbers></response>",
        );

        let params = RequestParams {
            localareacode: Some("0371".to_string()),
            ..Default::default()
        };
        let outcome = envia.run(Job::MiscGetFreeNumbers, &params).await.unwrap();

        let Outcome::FreeNumbers { numbers } = outcome else {
            panic!("unexpected outcome");
        };
        assert_eq!(numbers, vec!["0371/200", "0371/1000"]);
    }

    #[tokio::test]
    async fn test_attachment_upload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("1")).unwrap();
        std::fs::write(dir.path().join("1").join("contract.pdf"), b"%PDF-1.4").unwrap();

        let store = entities();
        let (envia, transport) = service(&store, dir.path());
        let related = placed_order(&store, "8001", "contract/create").await;
        let document = EnviaOrderDocument {
            id: EnviaOrderDocumentId(3),
            enviaorder_id: related.id,
            document_type: "Vertrag".to_string(),
            mime_type: "application/pdf".to_string(),
            filename: "contract.pdf".to_string(),
            upload_order_id: None,
        };
        store.save_order_document(&document).await.unwrap();
        transport.answer(201, "<response><orderid>8002</orderid></response>");

        let params = RequestParams {
            order_id: Some("8001".to_string()),
            enviaorderdocument_id: Some(EnviaOrderDocumentId(3)),
            ..Default::default()
        };
        let outcome = envia.run(Job::OrderCreateAttachment, &params).await.unwrap();

        let Outcome::AttachmentUploaded { order } = outcome else {
            panic!("unexpected outcome");
        };
        assert!(order.is_trashed());
        assert_eq!(order.related_order_id.as_deref(), Some("8001"));

        let (_, body) = transport.last_request();
        assert!(body.contains(&BASE64.encode(b"%PDF-1.4")));

        let stored = store.order_document(EnviaOrderDocumentId(3)).await.unwrap().unwrap();
        assert_eq!(stored.upload_order_id.as_deref(), Some("8002"));

        // a second upload of the same document is refused before sending
        let err = envia.run(Job::OrderCreateAttachment, &params).await.unwrap_err();
        assert!(matches!(err, EnviaError::InvalidArgument(_)));
        assert_eq!(envia.requests_sent(), 1);
    }

    #[tokio::test]
    async fn test_ping() {
        let store = entities();
        let (envia, transport) = service(&store, Path::new("documents"));
        transport.answer(200, "<response><pong>pong</pong></response>");

        let outcome = envia.run(Job::MiscPing, &RequestParams::default()).await.unwrap();

        assert!(matches!(outcome, Outcome::Pong { ok: true }));
        let (url, _) = transport.last_request();
        assert_eq!(url, "https://envia.example/api/misc/ping");
    }
}
