//! End-to-end flows through the [`Storefront`] facade: construction from
//! config, hydration of persisted state, and the cached product catalog.

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use pomelo_core::{CartLine, ProductId};
use pomelo_integration_tests::Harness;

fn product_json(id: &str, name: &str, amount: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "price": { "amount": amount, "currencyCode": "USD" },
    })
}

#[tokio::test]
async fn test_anonymous_browse_and_cart_flow() {
    let h = Harness::new().await;
    let (store, _state_dir) = h.storefront();

    // Second list() must come from the cache
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            product_json("p1", "Pomelo", "10.00"),
            product_json("p2", "Yuzu", "3.50"),
        ])))
        .expect(1)
        .mount(&h.server)
        .await;

    let products = store.products().list().await.expect("list");
    assert_eq!(products.len(), 2);
    let again = store.products().list().await.expect("cached list");
    assert_eq!(again.len(), 2);

    // Anonymous cart mutation touches no endpoint
    let first = &products[0];
    store
        .cart()
        .add_item(CartLine {
            product_id: first.id.clone(),
            name: first.name.clone(),
            unit_price: first.price.amount,
            quantity: 2,
            image_url: first.image_url.clone(),
        })
        .await
        .expect("add");
    assert_eq!(store.cart().total_items(), 2);
    assert_eq!(store.cart().total_price(), "20.00".parse().expect("decimal"));
}

#[tokio::test]
async fn test_product_detail_is_cached() {
    let h = Harness::new().await;
    let (store, _state_dir) = h.storefront();

    Mock::given(method("GET"))
        .and(path("/products/p1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(product_json("p1", "Pomelo", "10.00")),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let id = ProductId::new("p1");
    let product = store.products().get(&id).await.expect("get");
    assert_eq!(product.name, "Pomelo");
    let cached = store.products().get(&id).await.expect("cached get");
    assert_eq!(cached.name, "Pomelo");
}

#[tokio::test]
async fn test_unknown_product_surfaces_error() {
    let h = Harness::new().await;
    let (store, _state_dir) = h.storefront();

    Mock::given(method("GET"))
        .and(path("/products/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "message": "Product not found",
            "statusCode": 404,
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = store
        .products()
        .get(&ProductId::new("missing"))
        .await
        .expect_err("404 must surface");
    assert_eq!(err.http_status, Some(404));
    assert_eq!(err.message, "Product not found");
}
