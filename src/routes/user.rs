use actix_web::{get, post, web, HttpMessage, HttpRequest, HttpResponse};
use mongodb::bson::{doc, to_bson};
use regex::Regex;

use crate::{
    error::Error,
    models::user::{
        User, UserAuthentication, UserCredential, UserQuery, UserRequest, UserResponse, UserRole,
    },
};

fn issuer(req: &HttpRequest) -> Result<UserAuthentication, Error> {
    match req.extensions().get::<UserAuthentication>() {
        Some(issuer) => Ok(issuer.clone()),
        None => Err(Error::authentication("Not authorized")),
    }
}

#[post("/users/login")]
pub async fn login(payload: web::Json<UserCredential>) -> Result<HttpResponse, Error> {
    let payload: UserCredential = payload.into_inner();

    let (token, user) = payload.authenticate().await?;

    Ok(HttpResponse::Ok().json(doc! {
        "token": to_bson::<String>(&token).unwrap(),
        "user": to_bson::<UserResponse>(&user).unwrap(),
    }))
}
#[post("/users")]
pub async fn create_user(
    payload: web::Json<UserRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let payload: UserRequest = payload.into_inner();
    let email_regex: Regex = Regex::new(
        r"^([a-z0-9_+]([a-z0-9_+.]*[a-z0-9_+])?)@([a-z0-9]+([\-\.]{1}[a-z0-9]+)*\.[a-z]{2,6})",
    )
    .unwrap();

    if payload.password.len() < 8 {
        return Err(Error::validation("Password must be at least 8 characters"));
    }
    if !email_regex.is_match(&payload.email) {
        return Err(Error::validation("Email is not valid"));
    }

    let mut user: User = User {
        _id: None,
        name: payload.name,
        email: payload.email,
        password: payload.password,
        role: payload.role,
        phone: payload.phone,
    };

    // The very first account bootstraps the workspace and must be able to
    // create the rest of the team.
    if User::count().await? == 0 {
        user.role = UserRole::TeamLeader;
    } else if issuer(&req)?.role != UserRole::TeamLeader {
        return Err(Error::authorization("Only team leaders can create users"));
    }

    if User::find_by_email(&user.email).await?.is_some() {
        return Err(Error::validation("User already exists"));
    }

    user.save().await?;

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}
#[get("/users")]
pub async fn get_users(req: HttpRequest) -> Result<HttpResponse, Error> {
    if issuer(&req)?.role != UserRole::TeamLeader {
        return Err(Error::authorization("Access denied"));
    }

    let query: UserQuery = UserQuery {
        _id: None,
        email: None,
        role: None,
        limit: None,
    };

    let users = User::find_many(&query).await?;
    Ok(HttpResponse::Ok().json(users))
}
#[get("/users/technical-officers")]
pub async fn get_technical_officers(req: HttpRequest) -> Result<HttpResponse, Error> {
    issuer(&req)?;

    let query: UserQuery = UserQuery {
        _id: None,
        email: None,
        role: Some(UserRole::TechnicalOfficer),
        limit: None,
    };

    let officers = User::find_many(&query).await?;
    Ok(HttpResponse::Ok().json(officers))
}
