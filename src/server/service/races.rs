use super::HuntService;
use crate::model::{
    HuntError, HuntEvent, NewRace, PublicQuestion, Question, QuestionId,
    QuestionInput, Race, RaceId, RaceStatus, RaceUpdate, Topic, Zone, ZoneId, ZoneInput,
};
use tracing::{info, instrument};

impl HuntService {
    #[instrument(skip(self, input))]
    pub async fn create_race(&self, input: NewRace, created_by: &str) -> Result<Race, HuntError> {
        let race = Race::new(input, created_by)?;
        self.races.insert_race(race.clone()).await?;
        info!(race_id = %race.id, name = %race.name, "Race created");
        Ok(race)
    }

    #[instrument(skip(self, update))]
    pub async fn update_race(&self, id: RaceId, update: RaceUpdate) -> Result<Race, HuntError> {
        let _guard = self.race_edits.lock().await;
        let mut race = self.race(id).await?;
        race.apply(update)?;
        self.races.save_race(race.clone()).await?;
        Ok(race)
    }

    #[instrument(skip(self))]
    pub async fn toggle_race(&self, id: RaceId) -> Result<Race, HuntError> {
        let _guard = self.race_edits.lock().await;
        let mut race = self.race(id).await?;
        race.is_active = !race.is_active;
        self.races.save_race(race.clone()).await?;
        info!(race_id = %id, is_active = race.is_active, "Race toggled");
        Ok(race)
    }

    /// Removes the race with its scores and detaches any lobby that points at it.
    #[instrument(skip(self))]
    pub async fn delete_race(&self, id: RaceId) -> Result<(), HuntError> {
        let _guard = self.race_edits.lock().await;
        let race = self.race(id).await?;

        let mut detached = Vec::new();
        {
            let _membership = self.membership.lock().await;
            for mut lobby in self.lobbies.list_lobbies().await? {
                if lobby.detach_race(id) {
                    self.lobbies.save_lobby(lobby.clone()).await?;
                    detached.push(lobby.id);
                }
            }
        }
        for lobby_id in detached {
            self.broadcast(
                Topic::Lobby(lobby_id),
                HuntEvent::RaceStatusChanged {
                    lobby_id,
                    status: "inactive".to_string(),
                    race_id: None,
                },
            )
            .await;
        }

        let question_ids: Vec<QuestionId> = race.ordered_questions().map(|(_, q)| q.id).collect();
        self.progress.delete_race_records(id, &question_ids).await?;
        self.races.delete_race(id).await?;
        info!(race_id = %id, "Race deleted");
        Ok(())
    }

    pub async fn get_race(&self, id: RaceId) -> Result<Race, HuntError> {
        self.race(id).await
    }

    pub async fn list_races(&self, active_only: bool) -> Result<Vec<Race>, HuntError> {
        let races = self.races.list_races().await?;
        Ok(races
            .into_iter()
            .filter(|race| !active_only || race.is_active)
            .collect())
    }

    // ===== Zones =====

    #[instrument(skip(self, input))]
    pub async fn add_zone(&self, race_id: RaceId, input: ZoneInput) -> Result<Zone, HuntError> {
        let _guard = self.race_edits.lock().await;
        let mut race = self.race(race_id).await?;
        let zone = race.add_zone(input)?.clone();
        self.races.save_race(race).await?;
        Ok(zone)
    }

    #[instrument(skip(self, input))]
    pub async fn update_zone(
        &self,
        race_id: RaceId,
        zone_id: ZoneId,
        input: ZoneInput,
    ) -> Result<Zone, HuntError> {
        let _guard = self.race_edits.lock().await;
        let mut race = self.race(race_id).await?;
        let zone = race.update_zone(zone_id, input)?.clone();
        self.races.save_race(race).await?;
        Ok(zone)
    }

    #[instrument(skip(self))]
    pub async fn delete_zone(&self, race_id: RaceId, zone_id: ZoneId) -> Result<(), HuntError> {
        let _guard = self.race_edits.lock().await;
        let mut race = self.race(race_id).await?;
        race.remove_zone(zone_id)?;
        self.races.save_race(race).await?;
        Ok(())
    }

    // ===== Questions =====

    #[instrument(skip(self, input))]
    pub async fn add_question(
        &self,
        race_id: RaceId,
        input: QuestionInput,
    ) -> Result<Question, HuntError> {
        let _guard = self.race_edits.lock().await;
        let mut race = self.race(race_id).await?;
        let question = race.add_question(input)?.clone();
        self.races.save_race(race).await?;
        Ok(question)
    }

    #[instrument(skip(self, input))]
    pub async fn update_question(
        &self,
        race_id: RaceId,
        question_id: QuestionId,
        input: QuestionInput,
    ) -> Result<Question, HuntError> {
        let _guard = self.race_edits.lock().await;
        let mut race = self.race(race_id).await?;
        let question = race.update_question(question_id, input)?.clone();
        self.races.save_race(race).await?;
        Ok(question)
    }

    #[instrument(skip(self))]
    pub async fn delete_question(
        &self,
        race_id: RaceId,
        question_id: QuestionId,
    ) -> Result<(), HuntError> {
        let _guard = self.race_edits.lock().await;
        let mut race = self.race(race_id).await?;
        race.remove_question(question_id)?;
        self.races.save_race(race).await?;
        Ok(())
    }

    // ===== Status =====

    /// A race counts as started once any lobby has started it.
    pub async fn race_status(&self, race_id: RaceId) -> Result<RaceStatus, HuntError> {
        let race = self.race(race_id).await?;
        let start_time = self
            .lobbies
            .list_lobbies()
            .await?
            .into_iter()
            .filter(|lobby| lobby.hunt_started && lobby.race_id == Some(race_id))
            .filter_map(|lobby| lobby.start_time)
            .min();

        Ok(RaceStatus {
            race_id,
            is_active: race.is_active,
            started: start_time.is_some(),
            start_time,
        })
    }

    pub async fn race_questions(&self, race_id: RaceId) -> Result<Vec<PublicQuestion>, HuntError> {
        Ok(self.race(race_id).await?.public_questions())
    }
}
