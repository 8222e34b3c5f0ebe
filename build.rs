fn main() {
    println!("cargo:rustc-check-cfg=cfg(has_sentinel)");
    println!("cargo:rerun-if-changed=asm/sentinel.S");

    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if !matches!(arch.as_str(), "x86" | "x86_64" | "arm" | "aarch64") {
        println!("cargo:warning=no integrity sentinel for target arch '{}'", arch);
        return;
    }

    cc::Build::new()
        .file("asm/sentinel.S")
        .compile("security_core_asm");

    println!("cargo:rustc-cfg=has_sentinel");
}
