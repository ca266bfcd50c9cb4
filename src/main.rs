fn main() {
    tournament_scorekeeper_lib::run()
}
