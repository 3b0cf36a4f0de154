//! Tests for the login-time cart merge: local lines offered to the server's
//! bulk sync, the server's answer adopted wholesale, concurrent triggers
//! collapsed, and the session-watcher path that drives it in production.

use std::time::Duration;

use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use pomelo_core::ProductId;
use pomelo_integration_tests::{auth_json, cart_item_json, cart_json, line, Harness};

#[tokio::test]
async fn test_merge_offers_local_lines_and_adopts_answer() {
    let h = Harness::new().await;
    h.cart.add_item(line("p1", "10.00", 2)).await.expect("add");
    h.cart.add_item(line("p2", "3.50", 1)).await.expect("add");
    h.seed_session("access", "refresh");

    // The server already held 3 of p1; its answer is the merged truth
    Mock::given(method("POST"))
        .and(path("/cart/sync"))
        .and(body_json(serde_json::json!([
            {"productId": "p1", "quantity": 2},
            {"productId": "p2", "quantity": 1},
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(&[
            cart_item_json("l1", "p1", "10.00", 5),
            cart_item_json("l2", "p2", "3.50", 1),
        ])))
        .expect(1)
        .mount(&h.server)
        .await;

    h.cart.merge_local_into_server().await.expect("merge");

    let items = h.cart.items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].quantity, 5, "server's merged quantity wins");
    assert_eq!(h.cart.total_price(), "53.50".parse().expect("decimal"));
}

#[tokio::test]
async fn test_merge_adopts_answer_even_when_server_drops_a_line() {
    let h = Harness::new().await;
    h.cart.add_item(line("p1", "10.00", 2)).await.expect("add");
    h.cart.add_item(line("p2", "3.50", 1)).await.expect("add");
    h.cart.add_item(line("p3", "5.00", 4)).await.expect("add");
    h.seed_session("access", "refresh");

    // p2 went out of stock; the server's answer omits it
    Mock::given(method("POST"))
        .and(path("/cart/sync"))
        .and(body_json(serde_json::json!([
            {"productId": "p1", "quantity": 2},
            {"productId": "p2", "quantity": 1},
            {"productId": "p3", "quantity": 4},
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(&[
            cart_item_json("l1", "p1", "10.00", 2),
            cart_item_json("l3", "p3", "5.00", 4),
        ])))
        .expect(1)
        .mount(&h.server)
        .await;

    h.cart.merge_local_into_server().await.expect("merge");

    let products: Vec<_> = h.cart.items().into_iter().map(|l| l.product_id).collect();
    assert_eq!(products, vec![ProductId::new("p1"), ProductId::new("p3")]);
}

#[tokio::test]
async fn test_merge_with_empty_local_adopts_server_cart() {
    let h = Harness::new().await;
    h.seed_session("access", "refresh");

    Mock::given(method("POST"))
        .and(path("/cart/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(&[])))
        .expect(0)
        .mount(&h.server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cart_json(&[cart_item_json("l1", "p1", "10.00", 2)])),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    h.cart.merge_local_into_server().await.expect("merge");
    assert_eq!(h.cart.total_items(), 2);
}

#[tokio::test]
async fn test_concurrent_merge_triggers_collapse() {
    let h = Harness::new().await;
    h.cart.add_item(line("p1", "10.00", 2)).await.expect("add");
    h.seed_session("access", "refresh");

    // Slow sync so the second trigger lands while the first is in flight
    Mock::given(method("POST"))
        .and(path("/cart/sync"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cart_json(&[cart_item_json("l1", "p1", "10.00", 2)]))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let (a, b) = tokio::join!(h.cart.merge_local_into_server(), h.cart.merge_local_into_server());
    a.expect("first trigger");
    b.expect("collapsed trigger");
    assert_eq!(h.cart.total_items(), 2);
}

#[tokio::test]
async fn test_merge_while_anonymous_is_a_noop() {
    let h = Harness::new().await;
    h.cart.add_item(line("p1", "10.00", 2)).await.expect("add");

    Mock::given(method("POST"))
        .and(path("/cart/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(&[])))
        .expect(0)
        .mount(&h.server)
        .await;

    h.cart.merge_local_into_server().await.expect("merge");
    assert_eq!(h.cart.total_items(), 2);
}

// ============================================================================
// Watcher-driven transitions
// ============================================================================

#[tokio::test]
async fn test_watcher_merges_on_login() {
    let h = Harness::new().await;
    h.cart.add_item(line("p1", "10.00", 2)).await.expect("add");
    let watcher = h.cart.spawn_session_watcher();

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_json("access", "refresh")))
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/cart/sync"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cart_json(&[cart_item_json("l1", "p1", "10.00", 7)])),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let email = pomelo_core::Email::parse("shopper@example.com").expect("valid email");
    let password = secrecy::SecretString::from("hunter2");
    h.auth.login(&email, &password).await.expect("login");

    // The merge runs in the watcher task; wait for it to land
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while h.cart.total_items() != 7 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "watcher never applied the merged cart"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    watcher.abort();
}

#[tokio::test]
async fn test_watcher_sees_login_racing_its_first_poll() {
    let h = Harness::new().await;
    h.cart.add_item(line("p1", "10.00", 2)).await.expect("add");

    // The server's answer differs from the local cart, so adoption is
    // observable
    Mock::given(method("POST"))
        .and(path("/cart/sync"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cart_json(&[cart_item_json("l1", "p1", "10.00", 5)])),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    // The login lands before the spawned task has ever been polled; it must
    // still be observed as a transition, not absorbed into the baseline
    let watcher = h.cart.spawn_session_watcher();
    h.seed_session("access", "refresh");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while h.cart.total_items() != 5 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "watcher missed the login transition"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    watcher.abort();
}

#[tokio::test]
async fn test_watcher_clears_local_cart_on_logout() {
    let h = Harness::new().await;
    h.seed_session("access", "refresh");
    let watcher = h.cart.spawn_session_watcher();

    // An authenticated cart mirrored locally
    h.local.add(line("p1", "10.00", 2)).expect("seed local");

    h.auth.logout().expect("logout");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !h.cart.items().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "watcher never cleared the local cart"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    watcher.abort();
}

#[tokio::test]
async fn test_explicit_clear_after_logout_needs_no_watcher() {
    // A short-lived process (the CLI) clears the cart itself on logout; the
    // cart must be empty as soon as the calls return, with no background
    // task involved
    let h = Harness::new().await;
    h.seed_session("access", "refresh");
    h.local.add(line("p1", "10.00", 2)).expect("seed local");

    h.auth.logout().expect("logout");
    h.cart.clear_cart().await.expect("clear");

    assert!(h.cart.items().is_empty());

    // Durable state is empty too, so a later process starts clean
    let h = h.restart();
    assert!(h.cart.items().is_empty());
    assert!(!h.session.is_authenticated());
}

#[tokio::test]
async fn test_login_starts_from_clean_slate_after_logout() {
    // Logout clears locally; a later login must offer nothing stale
    let h = Harness::new().await;
    h.seed_session("access", "refresh");
    let watcher = h.cart.spawn_session_watcher();
    h.local.add(line("p1", "10.00", 2)).expect("seed local");

    h.auth.logout().expect("logout");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !h.cart.items().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "cart not cleared");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Empty local cart: the merge falls back to adopting the server cart
    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cart_json(&[cart_item_json("l9", "p9", "1.00", 1)])),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cart/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(&[])))
        .expect(0)
        .mount(&h.server)
        .await;

    h.seed_session("access-2", "refresh-2");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while h.cart.items().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "watcher never adopted the server cart"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.cart.items()[0].product_id, ProductId::new("p9"));
    watcher.abort();
}
