use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize)]
pub struct Response {
    pub msg: String
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String
}

impl ErrorResponse {
    pub fn new(error: &str) -> ErrorResponse {
        ErrorResponse { error: error.to_string() }
    }
}

macro_rules! login_fail {
    () => {
        return Ok(HttpResponse::Unauthorized().json(ErrorResponse { error: "Unauthorized".to_string() })) }
}

macro_rules! server_error {
    ($msg: expr) => { return Ok(HttpResponse::InternalServerError().json(ErrorResponse::new($msg))) }
}

macro_rules! not_found {
    ($msg: expr) => { return Ok(HttpResponse::NotFound().json(ErrorResponse::new($msg))) }
}

macro_rules! bad_request {
    ($msg: expr) => { return Ok(HttpResponse::BadRequest().json(ErrorResponse::new($msg))) }
}

pub(crate) use login_fail;
pub(crate) use server_error;
pub(crate) use not_found;
pub(crate) use bad_request;
