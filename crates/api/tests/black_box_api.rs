use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};

use tourbook_api::app::{AppServices, build_app_with};
use tourbook_api::config::AppConfig;
use tourbook_auth::{Hs256Jwt, NewUser, Role, User};
use tourbook_core::UserId;
use tourbook_infra::{EntityStore, RecordingMailer, SIGNATURE_HEADER, WebhookVerifier};
use tourbook_query::Filter;

const JWT_SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "whsec_test";
const PASSWORD: &str = "pass1234";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    users: Arc<dyn EntityStore<User>>,
    jwt: Arc<Hs256Jwt>,
    mailer: Arc<RecordingMailer>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let mut config = AppConfig::development(JWT_SECRET);
        config.stripe_webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let mailer = Arc::new(RecordingMailer::new());
        let services = AppServices::in_memory(config).with_mailer(mailer.clone());
        let users = services.users.clone();
        let jwt = services.jwt.clone();

        // Same router as prod, bound to an ephemeral port.
        let app = build_app_with(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            users,
            jwt,
            mailer,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Insert a user directly and mint a token for them through the real codec.
    async fn seed_user(&self, name: &str, email: &str, role: Role) -> (UserId, String) {
        let mut user = User::register(
            NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password: PASSWORD.to_string(),
                password_confirm: PASSWORD.to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        user.role = role;
        let user = self.users.insert(user).await.unwrap();
        let token = self.jwt.issue(user.id, Utc::now()).unwrap();
        (user.id, token)
    }

    async fn create_tour(&self, token: &str, body: Value) -> Value {
        let res = self
            .client
            .post(self.url("/tours"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        let body: Value = res.json().await.unwrap();
        assert_eq!(status, StatusCode::CREATED, "create tour failed: {body}");
        body["data"]["data"].clone()
    }

    async fn get_json(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn tour_body(name: &str, price: f64, rating: f64, duration: u32, difficulty: &str) -> Value {
    json!({
        "name": name,
        "duration": duration,
        "maxGroupSize": 10,
        "difficulty": difficulty,
        "price": price,
        "ratingsAverage": rating,
        "summary": "Exploring the jaw-dropping landscapes",
        "imageCover": "tour-cover.jpg",
        "startDates": ["2021-06-19T09:00:00Z", "2021-07-20T09:00:00Z"],
        "startLocation": {
            "type": "Point",
            "coordinates": [-80.185942, 25.774772],
            "address": "Miami, USA"
        }
    })
}

fn names(body: &Value) -> Vec<String> {
    body["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|doc| doc["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, body) = srv.get_json("/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "fail");
    assert_eq!(body["message"], "Can't find /api/v1/nowhere on this server.");
}

#[tokio::test]
async fn signup_login_and_me() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.url("/users/signup"))
        .json(&json!({
            "name": "Laura Wilson",
            "email": " Laura@Example.com ",
            "password": PASSWORD,
            "passwordConfirm": PASSWORD,
            "role": "admin"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(res.headers().get("set-cookie").is_some());
    let body: Value = res.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["user"]["email"], "laura@example.com");
    assert_eq!(body["data"]["user"]["role"], "user");
    assert!(body["data"]["user"].get("password").is_none());

    let welcome = srv.mailer.last_to("laura@example.com").unwrap();
    assert_eq!(welcome.subject, "Welcome to the Tourbook family!");

    let (status, me) = srv.get_json("/users/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["data"]["name"], "Laura Wilson");

    // Same email again.
    let res = srv
        .client
        .post(srv.url("/users/signup"))
        .json(&json!({"name": "L", "email": "laura@example.com", "password": PASSWORD, "passwordConfirm": PASSWORD}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Duplicate field value: laura@example.com. Please use another value!"
    );

    let res = srv
        .client
        .post(srv.url("/users/login"))
        .json(&json!({"email": "laura@example.com", "password": "wrong-password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Incorrect email or password");

    let res = srv
        .client
        .post(srv.url("/users/login"))
        .json(&json!({"email": "laura@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .post(srv.url("/users/login"))
        .json(&json!({"email": "LAURA@example.com", "password": PASSWORD}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let cookie_token = body["token"].as_str().unwrap().to_string();

    // The cookie works in place of the header.
    let res = srv
        .client
        .get(srv.url("/users/me"))
        .header("cookie", format!("jwt={cookie_token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_a_live_token() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get_json("/reviews", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "You are not logged in! Please log in to get access.");

    let (status, body) = srv.get_json("/reviews", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token. Please log in again!");

    let expired = Hs256Jwt::new(JWT_SECRET.as_bytes(), ChronoDuration::minutes(1))
        .issue(UserId::new(), Utc::now() - ChronoDuration::hours(1))
        .unwrap();
    let (status, body) = srv.get_json("/reviews", Some(&expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Your token has expired! Please log in again.");

    let orphan = srv.jwt.issue(UserId::new(), Utc::now()).unwrap();
    let (status, body) = srv.get_json("/reviews", Some(&orphan)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "The user belonging to this token no longer exists.");

    let res = srv
        .client
        .get(srv.url("/users/me"))
        .header("cookie", "jwt=loggedout")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tour_catalogue_crud_and_roles() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Ada Admin", "admin@example.com", Role::Admin).await;
    let (_, user) = srv.seed_user("Uma User", "user@example.com", Role::User).await;

    let res = srv
        .client
        .post(srv.url("/tours"))
        .bearer_auth(&user)
        .json(&tour_body("The Forest Hiker", 397.0, 4.7, 5, "easy"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let created = srv
        .create_tour(&admin, tour_body("The Forest Hiker", 397.0, 4.7, 5, "easy"))
        .await;
    assert_eq!(created["slug"], "the-forest-hiker");
    assert_eq!(created["durationWeeks"].as_f64().unwrap(), 5.0 / 7.0);
    let id = created["id"].as_str().unwrap().to_string();

    // Duplicate name, then an invalid body.
    let res = srv
        .client
        .post(srv.url("/tours"))
        .bearer_auth(&admin)
        .json(&tour_body("The Forest Hiker", 100.0, 4.0, 3, "easy"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .post(srv.url("/tours"))
        .bearer_auth(&admin)
        .json(&json!({"name": "Short"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().starts_with("Invalid input data."));

    let res = srv
        .client
        .patch(srv.url(&format!("/tours/{id}")))
        .bearer_auth(&admin)
        .json(&json!({"price": 497, "priceDiscount": 600}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .patch(srv.url(&format!("/tours/{id}")))
        .bearer_auth(&admin)
        .json(&json!({"price": 497}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["data"]["price"], 497.0);

    let (status, body) = srv.get_json(&format!("/tours/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"]["reviews"], json!([]));

    let (status, body) = srv.get_json("/tours/not-an-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "fail");

    let res = srv
        .client
        .delete(srv.url(&format!("/tours/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.text().await.unwrap().is_empty());

    let (status, body) = srv.get_json(&format!("/tours/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No document found with that ID");

    // Writes against a missing document fail the same way.
    let res = srv
        .client
        .patch(srv.url(&format!("/tours/{id}")))
        .bearer_auth(&admin)
        .json(&json!({"price": 100}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "fail");
    assert_eq!(body["message"], "No document found with that ID");

    let res = srv
        .client
        .delete(srv.url(&format!("/tours/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "fail");
    assert_eq!(body["message"], "No document found with that ID");
}

#[tokio::test]
async fn list_queries_filter_sort_select_and_paginate() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Ada Admin", "admin@example.com", Role::Admin).await;

    srv.create_tour(&admin, tour_body("The Sea Explorer", 500.0, 4.8, 7, "medium")).await;
    srv.create_tour(&admin, tour_body("The Snow Adventurer", 300.0, 4.8, 4, "difficult")).await;
    srv.create_tour(&admin, tour_body("The City Wanderer", 200.0, 4.1, 9, "easy")).await;
    srv.create_tour(&admin, tour_body("The Park Camper", 900.0, 4.5, 10, "medium")).await;
    let mut secret = tour_body("The Secret Hideaway", 100.0, 5.0, 3, "easy");
    secret["secretTour"] = json!(true);
    let secret = srv.create_tour(&admin, secret).await;

    let (status, body) = srv.get_json("/tours?sort=-ratingsAverage,price&limit=2&page=1&fields=name,price", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["results"], 2);
    assert_eq!(names(&body), ["The Snow Adventurer", "The Sea Explorer"]);
    let first = body["data"]["data"][0].as_object().unwrap();
    let mut keys: Vec<&str> = first.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["id", "name", "price"]);

    let (_, body) = srv.get_json("/tours?duration[gte]=7&sort=price&fields=name", None).await;
    assert_eq!(names(&body), ["The City Wanderer", "The Sea Explorer", "The Park Camper"]);

    let (_, body) = srv.get_json("/tours?difficulty=easy&difficulty=difficult&sort=name", None).await;
    assert_eq!(names(&body), ["The City Wanderer", "The Snow Adventurer"]);

    // Secret tours are hidden from lists and lookups alike.
    let (_, body) = srv.get_json("/tours?limit=100", None).await;
    assert_eq!(body["results"], 4);
    assert!(body["data"]["data"][0].get("__v").is_none());
    let (status, _) = srv
        .get_json(&format!("/tours/{}", secret["id"].as_str().unwrap()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = srv.get_json("/tours?page=9&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 0);

    let (status, _) = srv.get_json("/tours?fields=name,-price", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = srv.get_json("/tours/top-5-cheap", None).await;
    assert_eq!(body["results"], 4);
    assert_eq!(names(&body)[0], "The Snow Adventurer");
    assert!(body["data"]["data"][0].get("duration").is_none());

    let (_, body) = srv.get_json("/tours/tour-stats", None).await;
    let stats = body["data"]["stats"].as_array().unwrap();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats[0]["difficulty"], "EASY");
    assert_eq!(stats[2]["difficulty"], "MEDIUM");
    assert_eq!(stats[2]["numTours"], 2);
}

#[tokio::test]
async fn monthly_plan_and_geo_queries() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Ada Admin", "admin@example.com", Role::Admin).await;
    let (_, user) = srv.seed_user("Uma User", "user@example.com", Role::User).await;

    srv.create_tour(&admin, tour_body("The Sea Explorer", 500.0, 4.8, 7, "medium")).await;
    let mut far = tour_body("The Northern Lights", 800.0, 4.9, 3, "easy");
    far["startLocation"]["coordinates"] = json!([-118.113491, 34.111745]);
    far["startDates"] = json!(["2021-06-01T09:00:00Z"]);
    srv.create_tour(&admin, far).await;

    let (status, _) = srv.get_json("/tours/monthly-plan/2021", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.get_json("/tours/monthly-plan/2021", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let plan = body["data"]["plan"].as_array().unwrap();
    assert_eq!(plan[0]["month"], 6);
    assert_eq!(plan[0]["numTourStarts"], 2);
    assert_eq!(plan[1]["month"], 7);

    let (status, body) = srv.get_json("/tours/tours-within/200/center/25.77,-80.18/unit/mi", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), ["The Sea Explorer"]);

    let (_, body) = srv.get_json("/tours/distances/25.77,-80.18/unit/km", None).await;
    let distances = body["data"]["data"].as_array().unwrap();
    assert_eq!(distances[0]["name"], "The Sea Explorer");
    assert!(distances[0]["distance"].as_f64().unwrap() < 1.0);
    assert!(distances[1]["distance"].as_f64().unwrap() > 3000.0);

    let (status, body) = srv.get_json("/tours/distances/garbage/unit/km", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Please provide latitude and longitude in the format lat,lng.");
}

#[tokio::test]
async fn reviews_feed_the_tour_rating_and_respect_ownership() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Ada Admin", "admin@example.com", Role::Admin).await;
    let (_, uma) = srv.seed_user("Uma User", "uma@example.com", Role::User).await;
    let (_, leo) = srv.seed_user("Leo User", "leo@example.com", Role::User).await;

    let tour = srv.create_tour(&admin, tour_body("The Sea Explorer", 500.0, 0.0, 7, "medium")).await;
    let tour_id = tour["id"].as_str().unwrap();

    let post_review = |token: String, rating: f64| {
        let req = srv
            .client
            .post(srv.url(&format!("/tours/{tour_id}/reviews")))
            .bearer_auth(token)
            .json(&json!({"review": "Loved it", "rating": rating}));
        async move { req.send().await.unwrap() }
    };

    let res = post_review(uma.clone(), 4.0).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let review: Value = res.json().await.unwrap();
    let review_id = review["data"]["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(review["data"]["data"]["user"]["name"], "Uma User");

    assert_eq!(post_review(leo.clone(), 5.0).await.status(), StatusCode::CREATED);
    assert_eq!(post_review(uma.clone(), 1.0).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(post_review(admin.clone(), 3.0).await.status(), StatusCode::FORBIDDEN);

    let (_, body) = srv.get_json(&format!("/tours/{tour_id}"), None).await;
    assert_eq!(body["data"]["data"]["ratingsQuantity"], 2);
    assert_eq!(body["data"]["data"]["ratingsAverage"], 4.5);
    assert_eq!(body["data"]["data"]["reviews"].as_array().unwrap().len(), 2);

    let (_, body) = srv.get_json(&format!("/tours/{tour_id}/reviews"), Some(&leo)).await;
    assert_eq!(body["results"], 2);

    let res = srv
        .client
        .patch(srv.url(&format!("/reviews/{review_id}")))
        .bearer_auth(&leo)
        .json(&json!({"rating": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .patch(srv.url(&format!("/reviews/{review_id}")))
        .bearer_auth(&uma)
        .json(&json!({"rating": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let (_, body) = srv.get_json(&format!("/tours/{tour_id}"), None).await;
    assert_eq!(body["data"]["data"]["ratingsAverage"], 3.5);

    let res = srv
        .client
        .delete(srv.url(&format!("/reviews/{review_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let (_, body) = srv.get_json(&format!("/tours/{tour_id}"), None).await;
    assert_eq!(body["data"]["data"]["ratingsQuantity"], 1);
    assert_eq!(body["data"]["data"]["ratingsAverage"], 5.0);
}

#[tokio::test]
async fn moving_a_review_refreshes_both_tours() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Ada Admin", "admin@example.com", Role::Admin).await;
    let (_, uma) = srv.seed_user("Uma User", "uma@example.com", Role::User).await;

    let first = srv.create_tour(&admin, tour_body("The Sea Explorer", 500.0, 0.0, 7, "medium")).await;
    let second = srv.create_tour(&admin, tour_body("The Snow Adventurer", 900.0, 0.0, 4, "difficult")).await;
    let (first_id, second_id) = (first["id"].as_str().unwrap(), second["id"].as_str().unwrap());

    let res = srv
        .client
        .post(srv.url(&format!("/tours/{first_id}/reviews")))
        .bearer_auth(&uma)
        .json(&json!({"review": "Windy but fun", "rating": 4}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let review: Value = res.json().await.unwrap();
    let review_id = review["data"]["data"]["id"].as_str().unwrap().to_string();

    let res = srv
        .client
        .patch(srv.url(&format!("/reviews/{review_id}")))
        .bearer_auth(&uma)
        .json(&json!({"tour": second_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, body) = srv.get_json(&format!("/tours/{first_id}"), None).await;
    assert_eq!(body["data"]["data"]["ratingsQuantity"], 0);
    let (_, body) = srv.get_json(&format!("/tours/{second_id}"), None).await;
    assert_eq!(body["data"]["data"]["ratingsQuantity"], 1);
    assert_eq!(body["data"]["data"]["ratingsAverage"], 4.0);

    let res = srv
        .client
        .patch(srv.url(&format!("/reviews/{}", tourbook_core::ReviewId::new())))
        .bearer_auth(&uma)
        .json(&json!({"rating": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "fail");
}

#[tokio::test]
async fn password_reset_flow_invalidates_older_tokens() {
    let srv = TestServer::spawn().await;
    let (user_id, _) = srv.seed_user("Uma User", "uma@example.com", Role::User).await;
    let old_token = srv.jwt.issue(user_id, Utc::now() - ChronoDuration::hours(1)).unwrap();

    let res = srv
        .client
        .post(srv.url("/users/forgotPassword"))
        .json(&json!({"email": "nobody@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = srv
        .client
        .post(srv.url("/users/forgotPassword"))
        .json(&json!({"email": "uma@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let email = srv.mailer.last_to("uma@example.com").unwrap();
    let reset_token = email
        .text
        .split("/resetPassword/")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap()
        .to_string();

    let res = srv
        .client
        .patch(srv.url("/users/resetPassword/wrong-token"))
        .json(&json!({"password": "newpass123", "passwordConfirm": "newpass123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .patch(srv.url(&format!("/users/resetPassword/{reset_token}")))
        .json(&json!({"password": "newpass123", "passwordConfirm": "newpass123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Single use.
    let res = srv
        .client
        .patch(srv.url(&format!("/users/resetPassword/{reset_token}")))
        .json(&json!({"password": "again1234", "passwordConfirm": "again1234"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let (status, body) = srv.get_json("/users/me", Some(&old_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User recently changed password! Please log in again.");

    let res = srv
        .client
        .post(srv.url("/users/login"))
        .json(&json!({"email": "uma@example.com", "password": "newpass123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn failed_reset_email_clears_the_token() {
    let srv = TestServer::spawn().await;
    srv.seed_user("Uma User", "uma@example.com", Role::User).await;
    srv.mailer.set_failing(true);

    let res = srv
        .client
        .post(srv.url("/users/forgotPassword"))
        .json(&json!({"email": "uma@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "There was an error sending the email. Try again later!");

    let users = srv.users.find_entities(Filter::new()).await.unwrap();
    assert!(users[0].password_reset_token.is_none());
}

#[tokio::test]
async fn self_service_profile_and_deactivation() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.seed_user("Uma User", "uma@example.com", Role::User).await;

    let res = srv
        .client
        .patch(srv.url("/users/updateMe"))
        .bearer_auth(&token)
        .json(&json!({"password": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .patch(srv.url("/users/updateMe"))
        .bearer_auth(&token)
        .json(&json!({"name": "Uma Traveller", "role": "admin"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["user"]["name"], "Uma Traveller");
    assert_eq!(body["data"]["user"]["role"], "user");

    let res = srv
        .client
        .patch(srv.url("/users/updateMyPassword"))
        .bearer_auth(&token)
        .json(&json!({"passwordCurrent": "wrong", "password": "newpass123", "passwordConfirm": "newpass123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .delete(srv.url("/users/deleteMe"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv
        .client
        .post(srv.url("/users/login"))
        .json(&json!({"email": "uma@example.com", "password": PASSWORD}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_user_management() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Ada Admin", "admin@example.com", Role::Admin).await;
    let (uma_id, uma) = srv.seed_user("Uma User", "uma@example.com", Role::User).await;

    let (status, _) = srv.get_json("/users", Some(&uma)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.get_json("/users?role=user", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 1);
    assert!(body["data"]["data"][0].get("password").is_none());

    let res = srv
        .client
        .post(srv.url("/users"))
        .bearer_auth(&admin)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "This route is not defined! Please use /signup instead");

    let res = srv
        .client
        .patch(srv.url(&format!("/users/{uma_id}")))
        .bearer_auth(&admin)
        .json(&json!({"role": "guide"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["data"]["role"], "guide");
}

#[tokio::test]
async fn checkout_and_webhook_record_a_booking() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Ada Admin", "admin@example.com", Role::Admin).await;
    let (_, uma) = srv.seed_user("Uma User", "uma@example.com", Role::User).await;
    let tour = srv.create_tour(&admin, tour_body("The Sea Explorer", 497.0, 4.8, 7, "medium")).await;
    let tour_id = tour["id"].as_str().unwrap();

    let (status, body) = srv
        .get_json(&format!("/bookings/checkout-session/{tour_id}"), Some(&uma))
        .await;
    assert_eq!(status, StatusCode::OK);
    let session = &body["session"];
    assert_eq!(session["amount_total"], 49_700);
    assert_eq!(session["client_reference_id"], tour_id);
    assert_eq!(session["customer_email"], "uma@example.com");

    let (status, _) = srv.get_json("/bookings", Some(&uma)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let payload = serde_json::to_vec(&json!({
        "type": "checkout.session.completed",
        "data": { "object": session }
    }))
    .unwrap();
    let webhook_url = format!("{}/webhook-checkout", srv.base_url);

    let res = srv
        .client
        .post(&webhook_url)
        .header(SIGNATURE_HEADER, "t=1,v1=deadbeef")
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.text().await.unwrap().starts_with("Webhook error: "));

    let signature = WebhookVerifier::new(WEBHOOK_SECRET)
        .sign(&payload, Utc::now().timestamp())
        .unwrap();
    let res = srv
        .client
        .post(&webhook_url)
        .header(SIGNATURE_HEADER, signature)
        .body(payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["received"], true);

    let (status, body) = srv.get_json("/bookings", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 1);
    assert_eq!(body["data"]["data"][0]["price"], 497.0);
    assert_eq!(body["data"]["data"][0]["tour"], tour_id);
    assert_eq!(body["data"]["data"][0]["paid"], true);
}
