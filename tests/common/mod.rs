#![allow(dead_code)]

use std::sync::Arc;

use cielo_gateway::orders::{InMemoryOrderRepository, Order, OrderRepository};
use cielo_gateway::payments::providers::{CieloConfig, CieloProvider};
use cielo_gateway::payments::{CieloGateway, GatewaySettings};
use rust_decimal::Decimal;
use wiremock::MockServer;

pub const AFFILIATION_NUMBER: &str = "1006993069";
pub const AFFILIATION_KEY: &str = "integration-test-key";

/// Gateway wired to a mock Cielo endpoint with an in-memory order store
pub struct TestGateway {
    pub gateway: Arc<CieloGateway>,
    pub orders: InMemoryOrderRepository,
}

pub async fn gateway(server: &MockServer, settings: GatewaySettings) -> TestGateway {
    let config = CieloConfig {
        affiliation_number: AFFILIATION_NUMBER.to_string(),
        affiliation_key: AFFILIATION_KEY.to_string(),
        endpoint: Some(format!("{}/servicos/ecommwsec.do", server.uri())),
        timeout_secs: 5,
        ..Default::default()
    };
    let provider = CieloProvider::new(config, settings.store_contract).unwrap();
    let orders = InMemoryOrderRepository::new();
    let gateway = CieloGateway::new(settings, Arc::new(provider), Arc::new(orders.clone()));

    TestGateway {
        gateway: Arc::new(gateway),
        orders,
    }
}

pub async fn seed_order(orders: &InMemoryOrderRepository, id: u64, total: Decimal) -> Order {
    orders.insert(&Order::new(id, total)).await.unwrap()
}

pub fn transaction_xml(tid: &str, status: u8, authentication_url: Option<&str>) -> String {
    let url = authentication_url
        .map(|u| format!("<url-autenticacao>{}</url-autenticacao>", u))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<transacao versao="1.2.1" id="1" xmlns="http://ecommerce.cbmp.com.br">
  <tid>{tid}</tid>
  <pan>uv9yI5tkhX9jpuCt+dfrtoSVM4U3gIjvrcwMBfZcadE=</pan>
  <dados-pedido>
    <numero>1</numero>
    <valor>1000</valor>
  </dados-pedido>
  <status>{status}</status>
  {url}
</transacao>"#
    )
}

pub fn error_xml(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<erro xmlns="http://ecommerce.cbmp.com.br">
  <codigo>{code}</codigo>
  <mensagem><![CDATA[{message}]]></mensagem>
</erro>"#
    )
}
