use argon2::{Algorithm, Argon2, Params, Version};

pub fn password_hasher() -> Argon2<'static> {
    // Tuned for per-request verification on the proxy path: Argon2id with
    // moderate memory and a single iteration keeps verification under the
    // latency budget while retaining side-channel protections.
    const MEMORY_COST_KIB: u32 = 768;
    const ITERATIONS: u32 = 1;
    const PARALLELISM: u32 = 1;
    let params = Params::new(MEMORY_COST_KIB, ITERATIONS, PARALLELISM, Some(32))
        .expect("valid Argon2 parameters");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}
