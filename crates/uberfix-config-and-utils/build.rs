fn main() {
    // option_env!() values are cached by cargo unless the build script asks for a rerun.
    println!("cargo:rerun-if-env-changed=SUPABASE_URL");
    println!("cargo:rerun-if-env-changed=SUPABASE_ANON_KEY");
}
