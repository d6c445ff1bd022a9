fn main() {
    // Needed by cu29 logging macros (LOG_INDEX_DIR env var)
    println!(
        "cargo:rustc-env=LOG_INDEX_DIR={}",
        std::env::var("OUT_DIR").unwrap()
    );
}
