// build.rs

fn main() {
    let _ = build_data::set_SOURCE_TIMESTAMP();
    let _ = build_data::set_RUSTC_VERSION();

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
// EOF
