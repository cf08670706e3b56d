//! Checkout, return and refund flows against a mocked Cielo webservice

mod common;

use cielo_gateway::orders::{OrderRepository, OrderStatus};
use cielo_gateway::payments::gateway::GENERIC_CHECKOUT_ERROR;
use cielo_gateway::payments::types::{
    CardBrand, CheckoutOutcome, PaymentMethodKind, StoreContract, TransactionStatus,
};
use cielo_gateway::payments::validation::CheckoutForm;
use cielo_gateway::payments::{GatewaySettings, PaymentProvider};
use common::{error_xml, gateway, seed_order, transaction_xml};
use rust_decimal_macros::dec;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WS_PATH: &str = "/servicos/ecommwsec.do";

fn debit_form(brand: &str) -> CheckoutForm {
    CheckoutForm {
        card_brand: Some(brand.to_string()),
        ..Default::default()
    }
}

/// `<valor>` element as it appears in the form-encoded request body
fn valor(cents: u64) -> String {
    format!("%3Cvalor%3E{}%3C%2Fvalor%3E", cents)
}

/// Cielo answer encoded the way the webservice sends it
fn xml(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(latin1(&body), "application/xml; charset=ISO-8859-1")
}

fn latin1(body: &str) -> Vec<u8> {
    let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(body);
    bytes.into_owned()
}

#[tokio::test]
async fn buypage_checkout_redirects_to_cielo_and_stores_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(WS_PATH))
        .and(body_string_contains("requisicao-transacao"))
        .and(body_string_contains(valor(10990)))
        .respond_with(xml(transaction_xml(
            "10017348980735271001",
            0,
            Some("https://qasecommerce.cielo.com.br/web/index.cbmp?id=abc"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 42, dec!(109.90)).await;

    let result = ctx
        .gateway
        .process_payment(42, &debit_form("visaelectron"))
        .await
        .unwrap();

    assert_eq!(result.result, CheckoutOutcome::Success);
    assert_eq!(
        result.redirect,
        "https://qasecommerce.cielo.com.br/web/index.cbmp?id=abc"
    );

    let order = ctx.orders.get(42).await.unwrap();
    assert_eq!(order.transaction_id(), Some("10017348980735271001"));
    assert_eq!(order.card_brand(), Some("visa"));
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn debit_discount_is_applied_to_charged_amount() {
    let server = MockServer::start().await;
    // 109.90 with 10% off is 98.91
    Mock::given(method("POST"))
        .and(body_string_contains(valor(9891)))
        .respond_with(xml(transaction_xml("tid-discount", 0, Some("https://cielo/auth"))))
        .expect(1)
        .mount(&server)
        .await;

    let settings = GatewaySettings {
        debit_discount: dec!(10),
        ..Default::default()
    };
    let ctx = gateway(&server, settings).await;
    seed_order(&ctx.orders, 7, dec!(109.90)).await;

    let result = ctx
        .gateway
        .process_payment(7, &debit_form("visaelectron"))
        .await
        .unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn cielo_error_message_fails_checkout_without_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(xml(error_xml("001", "Mensagem inválida")))
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 3, dec!(20)).await;

    let result = ctx
        .gateway
        .process_payment(3, &debit_form("visaelectron"))
        .await
        .unwrap();

    assert_eq!(result.result, CheckoutOutcome::Fail);
    assert_eq!(result.messages, vec!["Mensagem inválida".to_string()]);

    let order = ctx.orders.get(3).await.unwrap();
    assert!(order.transaction_id().is_none());
    assert!(order.card_brand().is_none());
}

#[tokio::test]
async fn error_message_decoded_from_xml_declaration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(latin1(&error_xml("002", "Credenciais inválidas")), "text/xml"),
        )
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 4, dec!(20)).await;

    let result = ctx
        .gateway
        .process_payment(4, &debit_form("visaelectron"))
        .await
        .unwrap();

    assert_eq!(result.messages, vec!["Credenciais inválidas".to_string()]);
}

#[tokio::test]
async fn unaccepted_brand_never_reaches_cielo() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(xml(transaction_xml("never", 0, Some("https://cielo/auth"))))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 5, dec!(20)).await;

    let result = ctx
        .gateway
        .process_payment(5, &debit_form("maestro"))
        .await
        .unwrap();

    assert_eq!(result.result, CheckoutOutcome::Fail);
    assert_eq!(result.messages, vec!["Maestro is not accepted.".to_string()]);
}

#[tokio::test]
async fn transaction_without_redirect_is_generic_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(xml(transaction_xml("tid-no-url", 0, None)))
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 8, dec!(20)).await;

    let result = ctx
        .gateway
        .process_payment(8, &debit_form("visaelectron"))
        .await
        .unwrap();

    assert_eq!(result.messages, vec![GENERIC_CHECKOUT_ERROR.to_string()]);
    // tid is still recorded for later lookup
    let order = ctx.orders.get(8).await.unwrap();
    assert_eq!(order.transaction_id(), Some("tid-no-url"));
}

#[tokio::test]
async fn http_failure_is_generic_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 9, dec!(20)).await;

    let result = ctx
        .gateway
        .process_payment(9, &debit_form("visaelectron"))
        .await
        .unwrap();

    assert_eq!(result.messages, vec![GENERIC_CHECKOUT_ERROR.to_string()]);
    assert_eq!(ctx.orders.get(9).await.unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn webservice_credit_sends_card_and_redirects_to_return_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("dados-portador"))
        .and(body_string_contains("4012001037141112"))
        .respond_with(xml(transaction_xml("tid-ws", 4, None)))
        .expect(1)
        .mount(&server)
        .await;

    let settings = GatewaySettings {
        kind: PaymentMethodKind::Credit,
        store_contract: StoreContract::Webservice,
        methods: vec![CardBrand::Visa, CardBrand::Mastercard],
        public_url: "https://shop.example".to_string(),
        ..Default::default()
    };
    let ctx = gateway(&server, settings).await;
    seed_order(&ctx.orders, 11, dec!(300)).await;

    let form = CheckoutForm {
        card_brand: Some("visa".to_string()),
        installments: Some("3".to_string()),
        holder_name: Some("MARIA SILVA".to_string()),
        card_number: Some("4012 0010 3714 1112".to_string()),
        card_expiry: Some("05/2099".to_string()),
        card_cvc: Some("123".to_string()),
    };
    let result = ctx.gateway.process_payment(11, &form).await.unwrap();

    assert!(result.is_success());
    assert!(result
        .redirect
        .starts_with("https://shop.example/cielo/return?order=11&sig="));

    let order = ctx.orders.get(11).await.unwrap();
    assert_eq!(order.payment_method.as_deref(), Some("cielo_credit"));
    assert_eq!(order.card_brand(), Some("visa"));
}

#[tokio::test]
async fn webservice_holder_name_is_posted_in_latin1() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains(
            "%3Cnome-portador%3EJO%C3O+CONCEI%C7%C3O%3C%2Fnome-portador%3E",
        ))
        .respond_with(xml(transaction_xml("tid-latin1", 4, None)))
        .expect(1)
        .mount(&server)
        .await;

    let settings = GatewaySettings {
        store_contract: StoreContract::Webservice,
        ..Default::default()
    };
    let ctx = gateway(&server, settings).await;
    seed_order(&ctx.orders, 12, dec!(80)).await;

    let form = CheckoutForm {
        card_brand: Some("visaelectron".to_string()),
        holder_name: Some("JOÃO CONCEIÇÃO".to_string()),
        card_number: Some("4012001037141112".to_string()),
        card_expiry: Some("05/2099".to_string()),
        card_cvc: Some("123".to_string()),
        ..Default::default()
    };
    let result = ctx.gateway.process_payment(12, &form).await.unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn return_flow_queries_cielo_and_marks_order_processing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("requisicao-transacao"))
        .respond_with(xml(transaction_xml("tid-return", 0, Some("https://cielo/auth"))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("requisicao-consulta"))
        .and(body_string_contains("tid-return"))
        .respond_with(xml(transaction_xml("tid-return", 6, None)))
        .expect(2)
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 21, dec!(50)).await;
    ctx.gateway
        .process_payment(21, &debit_form("visaelectron"))
        .await
        .unwrap();

    let url = ctx.gateway.return_url(21);
    let sig = url.split("sig=").nth(1).unwrap();

    let outcome = ctx.gateway.check_return(21, sig).await.unwrap();
    assert_eq!(outcome.transaction_status, TransactionStatus::Captured);
    assert_eq!(outcome.order_status, OrderStatus::Processing);
    assert_eq!(
        outcome.redirect,
        "http://localhost:8080/checkout/order-received/21"
    );

    // a second visit leaves the paid order alone
    let again = ctx.gateway.check_return(21, sig).await.unwrap();
    assert_eq!(again.order_status, OrderStatus::Processing);
    assert_eq!(ctx.orders.get(21).await.unwrap().notes.len(), 1);
}

#[tokio::test]
async fn return_with_forged_signature_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(xml(transaction_xml("x", 4, None)))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 22, dec!(50)).await;

    let err = ctx.gateway.check_return(22, "deadbeef").await.unwrap_err();
    assert!(err.to_string().contains("Invalid return signature"));
}

#[tokio::test]
async fn partial_then_full_refund() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("requisicao-cancelamento"))
        .and(body_string_contains(valor(2500)))
        .respond_with(xml(transaction_xml("tid-refund", 6, None)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("requisicao-cancelamento"))
        .respond_with(xml(transaction_xml("tid-refund", 9, None)))
        .mount(&server)
        .await;

    let ctx = gateway(&server, GatewaySettings::default()).await;
    seed_order(&ctx.orders, 31, dec!(100)).await;
    ctx.orders
        .update_meta(31, &[("_transaction_id", "tid-refund")])
        .await
        .unwrap();
    ctx.orders
        .set_status(31, OrderStatus::Processing)
        .await
        .unwrap();

    let partial = ctx
        .gateway
        .process_refund(31, Some(dec!(25)), Some("damaged box"))
        .await
        .unwrap();
    assert!(!partial.full);
    assert_eq!(partial.order_status, OrderStatus::Processing);

    let full = ctx.gateway.process_refund(31, None, None).await.unwrap();
    assert!(full.full);
    assert_eq!(full.order_status, OrderStatus::Refunded);
    assert_eq!(ctx.orders.get(31).await.unwrap().status, OrderStatus::Refunded);
}

#[tokio::test]
async fn provider_signature_round_trip() {
    let server = MockServer::start().await;
    let ctx = gateway(&server, GatewaySettings::default()).await;
    let url = ctx.gateway.return_url(99);
    let sig = url.split("sig=").nth(1).unwrap().to_string();

    let config = cielo_gateway::payments::providers::CieloConfig {
        affiliation_number: common::AFFILIATION_NUMBER.to_string(),
        affiliation_key: common::AFFILIATION_KEY.to_string(),
        ..Default::default()
    };
    let provider = cielo_gateway::payments::providers::CieloProvider::new(
        config,
        StoreContract::BuypageCielo,
    )
    .unwrap();
    assert!(provider.validate_return_signature(99, &sig));
    assert!(!provider.validate_return_signature(98, &sig));
}
