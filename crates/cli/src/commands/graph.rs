//! `waypoint graph` - Print the node graph as a Mermaid flowchart.

use waypoint_workflow::Graph;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let graph = Graph::standard();
    graph.validate()?;
    print!("{}", graph.to_mermaid());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mermaid_starts_at_the_router() {
        let mermaid = Graph::standard().to_mermaid();
        assert!(mermaid.starts_with("flowchart TD"));
        assert!(mermaid.contains("intent_router"));
    }
}
