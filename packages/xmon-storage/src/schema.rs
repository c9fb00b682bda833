pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");

	init.replace("<VECTOR_DIM>", &vector_dim.to_string())
}
