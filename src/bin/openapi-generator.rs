//! Prints the OpenAPI document to stdout for CI artifact generation.

use grid_nations_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() {
    let doc = ApiDoc::openapi();
    println!("{}", doc.to_pretty_json().unwrap());
}
